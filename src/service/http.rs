use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tracing::debug;

use super::{Context, CursorId, FieldDescriptor, FieldType, OrmService};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::proto::DbMethod;

/// JSON-RPC transport to a running server
///
/// Speaks the server's `/jsonrpc` endpoint: one `call` envelope per request
/// naming the service (`object`, `wizard`, `db`), the method, and positional
/// args. Database-service method names and argument shapes go through the
/// versioned table in [`crate::proto`].
///
/// The wire protocol commits after every call, so cursors here are
/// client-side session markers: `commit` has nothing left to do and says so
/// at debug level. Tests that need real cursor semantics run against
/// [`super::memory::InMemoryServer`].
pub struct HttpService {
    http: reqwest::blocking::Client,
    endpoint: String,
    version: u32,
    admin_passwd: String,
    user: u32,
    password: String,
    cursors: Mutex<HashMap<CursorId, String>>,
    next_cursor: AtomicU64,
    request_id: AtomicU64,
}

impl HttpService {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| Error::Rpc(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/jsonrpc", config.url.trim_end_matches('/')),
            version: config.version,
            admin_passwd: config.admin_passwd.clone(),
            user: config.user,
            password: config.password.clone(),
            cursors: Mutex::new(HashMap::new()),
            next_cursor: AtomicU64::new(1),
            request_id: AtomicU64::new(1),
        })
    }

    fn call(&self, service: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {"service": service, "method": method, "args": args},
            "id": id,
        });
        debug!(service, method, id, "rpc call");

        let response: Value = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .map_err(|e| Error::Rpc(e.to_string()))?
            .json()
            .map_err(|e| Error::Rpc(e.to_string()))?;

        if let Some(err) = response.get("error") {
            if !err.is_null() {
                let message = err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("server error");
                let data = err
                    .pointer("/data/debug")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                return Err(Error::Rpc(format!("{method}: {message} {data}").trim_end().to_string()));
            }
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    fn cursor_db(&self, cursor: CursorId) -> Result<String> {
        self.cursors
            .lock()?
            .get(&cursor)
            .cloned()
            .ok_or_else(|| Error::Rpc(format!("unknown cursor {cursor}")))
    }

    fn object_args(
        &self,
        database: &str,
        uid: u32,
        model: &str,
        method: &str,
        args: &[Value],
        context: &Context,
    ) -> Vec<Value> {
        let mut wire = vec![
            json!(database),
            json!(uid),
            json!(self.password),
            json!(model),
            json!(method),
        ];
        wire.extend(args.iter().cloned());
        if !context.is_empty() {
            wire.push(Value::Object(context.clone()));
        }
        wire
    }
}

impl OrmService for HttpService {
    fn open_cursor(&self, database: &str) -> Result<CursorId> {
        let id = self.next_cursor.fetch_add(1, Ordering::Relaxed);
        self.cursors.lock()?.insert(id, database.to_string());
        Ok(id)
    }

    fn commit(&self, cursor: CursorId) -> Result<()> {
        self.cursor_db(cursor)?;
        debug!(cursor, "commit is a no-op over the wire; the server commits per call");
        Ok(())
    }

    fn close_cursor(&self, cursor: CursorId) -> Result<()> {
        self.cursors.lock()?.remove(&cursor);
        Ok(())
    }

    fn model_exists(&self, cursor: CursorId, model: &str) -> Result<bool> {
        let database = self.cursor_db(cursor)?;
        let args = self.object_args(
            &database,
            self.user,
            "ir.model",
            "search",
            &[json!([["model", "=", model]])],
            &Context::new(),
        );
        let ids = self.call("object", "execute", args)?;
        Ok(ids.as_array().is_some_and(|ids| !ids.is_empty()))
    }

    fn fields_get(
        &self,
        cursor: CursorId,
        uid: u32,
        model: &str,
    ) -> Result<HashMap<String, FieldDescriptor>> {
        let database = self.cursor_db(cursor)?;
        let args = self.object_args(&database, uid, model, "fields_get", &[], &Context::new());
        let raw = self.call("object", "execute", args)?;
        let map = raw
            .as_object()
            .ok_or_else(|| Error::Protocol(format!("fields_get returned {raw}")))?;

        let mut fields = HashMap::with_capacity(map.len());
        for (name, meta) in map {
            let ftype = meta
                .get("type")
                .and_then(Value::as_str)
                .map(FieldType::parse)
                .ok_or_else(|| Error::Protocol(format!("field '{name}' has no type")))?;
            let relation = meta
                .get("relation")
                .and_then(Value::as_str)
                .map(str::to_string);
            fields.insert(name.clone(), FieldDescriptor { ftype, relation });
        }
        Ok(fields)
    }

    fn execute(
        &self,
        cursor: CursorId,
        uid: u32,
        model: &str,
        method: &str,
        args: &[Value],
        context: &Context,
    ) -> Result<Value> {
        let database = self.cursor_db(cursor)?;
        let wire = self.object_args(&database, uid, model, method, args, context);
        self.call("object", "execute", wire)
    }

    fn wizard_create(
        &self,
        database: &str,
        uid: u32,
        password: &str,
        name: &str,
        data: &Context,
    ) -> Result<u64> {
        let args = vec![
            json!(database),
            json!(uid),
            json!(password),
            json!(name),
            Value::Object(data.clone()),
        ];
        let result = self.call("wizard", "create", args)?;
        result
            .as_u64()
            .ok_or_else(|| Error::Protocol(format!("wizard create returned {result}")))
    }

    fn wizard_execute(
        &self,
        database: &str,
        uid: u32,
        password: &str,
        wiz_id: u64,
        data: &Context,
        action: &str,
        context: &Context,
    ) -> Result<Value> {
        let args = vec![
            json!(database),
            json!(uid),
            json!(password),
            json!(wiz_id),
            Value::Object(data.clone()),
            json!(action),
            Value::Object(context.clone()),
        ];
        self.call("wizard", "execute", args)
    }

    fn db_create(&self, name: &str, demo: bool, lang: &str, user_password: &str) -> Result<Value> {
        let rest = vec![json!(name), json!(demo), json!(lang), json!(user_password)];
        let method = DbMethod::Create;
        self.call(
            "db",
            method.wire_name(self.version),
            method.wire_args(self.version, &self.admin_passwd, rest),
        )
    }

    fn db_get_progress(&self, token: &Value) -> Result<(f64, Value)> {
        let method = DbMethod::GetProgress;
        let result = self.call(
            "db",
            method.wire_name(self.version),
            method.wire_args(self.version, &self.admin_passwd, vec![token.clone()]),
        )?;
        let pair = result
            .as_array()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Protocol(format!("get_progress returned {result}")))?;
        let progress = pair[0]
            .as_f64()
            .ok_or_else(|| Error::Protocol(format!("bad progress value {}", pair[0])))?;
        let users = pair.get(1).cloned().unwrap_or(Value::Null);
        Ok((progress, users))
    }

    fn db_drop(&self, name: &str) -> Result<()> {
        let method = DbMethod::Drop;
        self.call(
            "db",
            method.wire_name(self.version),
            method.wire_args(self.version, &self.admin_passwd, vec![json!(name)]),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(version: u32) -> HttpService {
        let config = ServerConfig::new("/opt/openerp", "secret")
            .url("http://localhost:8069/")
            .version(version);
        HttpService::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_normalization() {
        let service = service(5);
        assert_eq!(service.endpoint, "http://localhost:8069/jsonrpc");
    }

    #[test]
    fn test_cursor_bookkeeping() {
        let service = service(5);
        let a = service.open_cursor("db_a").unwrap();
        let b = service.open_cursor("db_b").unwrap();
        assert_ne!(a, b);
        assert_eq!(service.cursor_db(a).unwrap(), "db_a");

        service.close_cursor(a).unwrap();
        assert!(service.cursor_db(a).is_err());
        assert_eq!(service.cursor_db(b).unwrap(), "db_b");
    }

    #[test]
    fn test_object_args_shape() {
        let service = service(5);
        let mut context = Context::new();
        context.insert("lang".to_string(), json!("en_US"));

        let args = service.object_args(
            "test_db",
            1,
            "res.partner",
            "search",
            &[json!([["name", "=", "Alice"]])],
            &context,
        );
        assert_eq!(args[0], json!("test_db"));
        assert_eq!(args[3], json!("res.partner"));
        assert_eq!(args[4], json!("search"));
        assert_eq!(args.last().unwrap(), &json!({"lang": "en_US"}));
    }
}
