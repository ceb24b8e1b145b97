use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::{Map, Value, json};

use super::{Context, CursorId, FieldDescriptor, FieldType, OrmService, value_is_falsy};
use crate::error::{Error, Result};

type Row = Map<String, Value>;

#[derive(Debug, Clone, Default)]
struct ModelDef {
    fields: HashMap<String, FieldDescriptor>,
}

/// Full state of one database: schema, rows, id allocator, default context
#[derive(Debug, Clone)]
struct DbState {
    models: HashMap<String, ModelDef>,
    rows: HashMap<String, BTreeMap<i64, Row>>,
    next_id: i64,
    default_context: Context,
}

impl DbState {
    /// What a freshly created database ships with: the admin user
    fn base() -> Self {
        let mut context = Context::new();
        context.insert("lang".to_string(), json!("en_US"));
        context.insert("tz".to_string(), json!(false));

        let mut state = Self {
            models: HashMap::new(),
            rows: HashMap::new(),
            next_id: 1,
            default_context: context,
        };
        state.define_model("res.users", &[("name", "char", None), ("login", "char", None)]);
        let mut admin = Row::new();
        admin.insert("name".to_string(), json!("Administrator"));
        admin.insert("login".to_string(), json!("admin"));
        state.insert("res.users", admin);
        state
    }

    fn define_model(&mut self, name: &str, fields: &[(&str, &str, Option<&str>)]) {
        let mut def = ModelDef::default();
        for (field, ftype, relation) in fields {
            def.fields.insert(
                (*field).to_string(),
                FieldDescriptor {
                    ftype: FieldType::parse(ftype),
                    relation: relation.map(str::to_string),
                },
            );
        }
        self.models.insert(name.to_string(), def);
        self.rows.entry(name.to_string()).or_default();
    }

    fn insert(&mut self, model: &str, row: Row) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.rows.entry(model.to_string()).or_default().insert(id, row);
        id
    }

    fn display_name(&self, model: &str, id: i64) -> String {
        self.rows
            .get(model)
            .and_then(|rows| rows.get(&id))
            .and_then(|row| row.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{model},{id}"))
    }

    /// Serialize a stored value the way the server's `read` does:
    /// empty is `false`, many2one is `[id, display_name]`
    fn serialized(&self, def: &FieldDescriptor, raw: Option<&Value>) -> Value {
        let raw = raw.unwrap_or(&Value::Null);
        if value_is_falsy(raw) {
            return Value::Bool(false);
        }
        match def.ftype {
            FieldType::Many2One | FieldType::One2One => match raw {
                Value::Number(n) => {
                    let id = n.as_i64().unwrap_or(0);
                    let name = def
                        .relation
                        .as_deref()
                        .map(|rel| self.display_name(rel, id))
                        .unwrap_or_default();
                    json!([id, name])
                }
                other => other.clone(),
            },
            _ => raw.clone(),
        }
    }
}

/// One open cursor: a private snapshot of the database taken at open time
///
/// Writes land in the snapshot; `commit` publishes it back. That gives the
/// snapshot isolation the transaction tests depend on.
#[derive(Debug)]
struct CursorState {
    database: String,
    snapshot: DbState,
}

#[derive(Debug)]
struct Inner {
    databases: HashMap<String, DbState>,
    /// Databases with a create still in flight: name -> polls so far
    pending_creates: HashMap<String, u32>,
    cursors: HashMap<CursorId, CursorState>,
    next_cursor: CursorId,
    wizards: HashMap<u64, String>,
    next_wizard: u64,
    create_polls_required: u32,
}

/// A process-local stand-in for the external server
///
/// Implements enough of the object/wizard/database services to exercise
/// every proxy path: model registry with field metadata, per-cursor snapshot
/// isolation, relational serialization (including empty-reads-as-`false`),
/// and a database create whose progress advances across polls.
pub struct InMemoryServer {
    inner: RwLock<Inner>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                databases: HashMap::new(),
                pending_creates: HashMap::new(),
                cursors: HashMap::new(),
                next_cursor: 1,
                wizards: HashMap::new(),
                next_wizard: 1,
                create_polls_required: 2,
            }),
        }
    }

    /// Register a ready database, skipping the create/poll dance
    pub fn add_database(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write()?;
        if inner.databases.contains_key(name) {
            return Err(Error::Rpc(format!("database '{name}' already exists")));
        }
        inner.databases.insert(name.to_string(), DbState::base());
        Ok(())
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.inner
            .read()
            .map(|inner| inner.databases.contains_key(name))
            .unwrap_or(false)
    }

    /// Register a model with `(field, type, relation)` triples
    pub fn define_model(
        &self,
        database: &str,
        model: &str,
        fields: &[(&str, &str, Option<&str>)],
    ) -> Result<()> {
        let mut inner = self.inner.write()?;
        let state = inner
            .databases
            .get_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        state.define_model(model, fields);
        Ok(())
    }

    /// Insert a committed row directly, bypassing cursor isolation
    pub fn seed(&self, database: &str, model: &str, values: Value) -> Result<i64> {
        let mut inner = self.inner.write()?;
        let state = inner
            .databases
            .get_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        if !state.models.contains_key(model) {
            return Err(Error::UnknownModel(model.to_string()));
        }
        let row = as_row(&values)?;
        Ok(state.insert(model, row))
    }

    /// Number of `get_progress` polls a create takes to reach 1.0
    pub fn set_create_polls_required(&self, polls: u32) -> Result<()> {
        self.inner.write()?.create_polls_required = polls.max(1);
        Ok(())
    }
}

impl Default for InMemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl OrmService for InMemoryServer {
    fn open_cursor(&self, database: &str) -> Result<CursorId> {
        let mut inner = self.inner.write()?;
        let snapshot = inner
            .databases
            .get(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?
            .clone();
        let id = inner.next_cursor;
        inner.next_cursor += 1;
        inner.cursors.insert(
            id,
            CursorState {
                database: database.to_string(),
                snapshot,
            },
        );
        Ok(id)
    }

    fn commit(&self, cursor: CursorId) -> Result<()> {
        let mut inner = self.inner.write()?;
        let cur = inner
            .cursors
            .get(&cursor)
            .ok_or_else(|| Error::Rpc(format!("unknown cursor {cursor}")))?;
        let database = cur.database.clone();
        let snapshot = cur.snapshot.clone();
        inner.databases.insert(database, snapshot);
        Ok(())
    }

    fn close_cursor(&self, cursor: CursorId) -> Result<()> {
        // Closing twice is fine; drop paths depend on that
        self.inner.write()?.cursors.remove(&cursor);
        Ok(())
    }

    fn model_exists(&self, cursor: CursorId, model: &str) -> Result<bool> {
        let inner = self.inner.read()?;
        let cur = inner
            .cursors
            .get(&cursor)
            .ok_or_else(|| Error::Rpc(format!("unknown cursor {cursor}")))?;
        Ok(cur.snapshot.models.contains_key(model))
    }

    fn fields_get(
        &self,
        cursor: CursorId,
        _uid: u32,
        model: &str,
    ) -> Result<HashMap<String, FieldDescriptor>> {
        let inner = self.inner.read()?;
        let cur = inner
            .cursors
            .get(&cursor)
            .ok_or_else(|| Error::Rpc(format!("unknown cursor {cursor}")))?;
        let def = cur
            .snapshot
            .models
            .get(model)
            .ok_or_else(|| Error::UnknownModel(model.to_string()))?;
        Ok(def.fields.clone())
    }

    fn execute(
        &self,
        cursor: CursorId,
        _uid: u32,
        model: &str,
        method: &str,
        args: &[Value],
        _context: &Context,
    ) -> Result<Value> {
        let mut inner = self.inner.write()?;
        let cur = inner
            .cursors
            .get_mut(&cursor)
            .ok_or_else(|| Error::Rpc(format!("unknown cursor {cursor}")))?;
        let state = &mut cur.snapshot;

        if model == "res.users" && method == "context_get" {
            return Ok(Value::Object(state.default_context.clone()));
        }
        if !state.models.contains_key(model) {
            return Err(Error::UnknownModel(model.to_string()));
        }

        match method {
            "create" => {
                let row = as_row(args.first().unwrap_or(&Value::Null))?;
                Ok(json!(state.insert(model, row)))
            }
            "search" => {
                let domain = args.first().cloned().unwrap_or_else(|| json!([]));
                Ok(json!(search_ids(state, model, &domain)?))
            }
            "search_count" => {
                let domain = args.first().cloned().unwrap_or_else(|| json!([]));
                Ok(json!(search_ids(state, model, &domain)?.len()))
            }
            "read" => read(state, model, args),
            "write" => {
                let ids = ids_arg(args.first().unwrap_or(&Value::Null))?;
                let values = as_row(args.get(1).unwrap_or(&Value::Null))?;
                for id in ids {
                    let row = state
                        .rows
                        .get_mut(model)
                        .and_then(|rows| rows.get_mut(&id))
                        .ok_or_else(|| Error::Rpc(format!("no record {id} in {model}")))?;
                    for (key, value) in values.clone() {
                        row.insert(key, value);
                    }
                }
                Ok(Value::Bool(true))
            }
            "unlink" => {
                let ids = ids_arg(args.first().unwrap_or(&Value::Null))?;
                if let Some(rows) = state.rows.get_mut(model) {
                    for id in ids {
                        rows.remove(&id);
                    }
                }
                Ok(Value::Bool(true))
            }
            "copy" => {
                let ids = ids_arg(args.first().unwrap_or(&Value::Null))?;
                let id = *ids
                    .first()
                    .ok_or_else(|| Error::Protocol("copy needs a record id".to_string()))?;
                let mut row = state
                    .rows
                    .get(model)
                    .and_then(|rows| rows.get(&id))
                    .cloned()
                    .ok_or_else(|| Error::Rpc(format!("no record {id} in {model}")))?;
                if let Some(defaults) = args.get(1) {
                    if !defaults.is_null() {
                        for (key, value) in as_row(defaults)? {
                            row.insert(key, value);
                        }
                    }
                }
                Ok(json!(state.insert(model, row)))
            }
            "name_get" => {
                let ids = ids_arg(args.first().unwrap_or(&Value::Null))?;
                let pairs: Vec<Value> = ids
                    .into_iter()
                    .map(|id| json!([id, state.display_name(model, id)]))
                    .collect();
                Ok(Value::Array(pairs))
            }
            // Module management is a no-op here; there is nothing to install
            "button_install" | "upgrade_module" => Ok(Value::Bool(true)),
            other => Err(Error::Rpc(format!(
                "method '{other}' is not supported by the in-memory server"
            ))),
        }
    }

    fn wizard_create(
        &self,
        database: &str,
        _uid: u32,
        _password: &str,
        name: &str,
        _data: &Context,
    ) -> Result<u64> {
        let mut inner = self.inner.write()?;
        if !inner.databases.contains_key(database) {
            return Err(Error::DatabaseNotFound(database.to_string()));
        }
        let id = inner.next_wizard;
        inner.next_wizard += 1;
        inner.wizards.insert(id, name.to_string());
        Ok(id)
    }

    fn wizard_execute(
        &self,
        _database: &str,
        _uid: u32,
        _password: &str,
        wiz_id: u64,
        data: &Context,
        action: &str,
        _context: &Context,
    ) -> Result<Value> {
        let inner = self.inner.read()?;
        let name = inner
            .wizards
            .get(&wiz_id)
            .ok_or_else(|| Error::Rpc(format!("unknown wizard instance {wiz_id}")))?;
        Ok(json!({
            "wizard": name,
            "action": action,
            "datas": Value::Object(data.clone()),
        }))
    }

    fn db_create(&self, name: &str, _demo: bool, _lang: &str, _user_password: &str) -> Result<Value> {
        let mut inner = self.inner.write()?;
        if inner.databases.contains_key(name) || inner.pending_creates.contains_key(name) {
            return Err(Error::Rpc(format!("database '{name}' already exists")));
        }
        inner.pending_creates.insert(name.to_string(), 0);
        Ok(json!(name))
    }

    fn db_get_progress(&self, token: &Value) -> Result<(f64, Value)> {
        let name = token
            .as_str()
            .ok_or_else(|| Error::Protocol("progress token is not a string".to_string()))?
            .to_string();
        let mut inner = self.inner.write()?;
        if inner.databases.contains_key(&name) {
            return Ok((1.0, json!([])));
        }
        let required = inner.create_polls_required;
        let polls = {
            let entry = inner
                .pending_creates
                .get_mut(&name)
                .ok_or_else(|| Error::DatabaseNotFound(name.clone()))?;
            *entry += 1;
            *entry
        };
        if polls >= required {
            inner.pending_creates.remove(&name);
            inner.databases.insert(name, DbState::base());
            Ok((1.0, json!([{"login": "admin"}])))
        } else {
            Ok((f64::from(polls) / f64::from(required), json!([])))
        }
    }

    fn db_drop(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write()?;
        inner.pending_creates.remove(name);
        inner
            .databases
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
    }
}

fn as_row(value: &Value) -> Result<Row> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| Error::Protocol(format!("expected a values mapping, got {value}")))
}

fn ids_arg(value: &Value) -> Result<Vec<i64>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(|id| vec![id])
            .ok_or_else(|| Error::Protocol(format!("bad record id {n}"))),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| Error::Protocol(format!("bad record id {v}")))
            })
            .collect(),
        other => Err(Error::Protocol(format!("expected record ids, got {other}"))),
    }
}

fn search_ids(state: &DbState, model: &str, domain: &Value) -> Result<Vec<i64>> {
    let clauses = domain
        .as_array()
        .ok_or_else(|| Error::Protocol("domain must be a list of triples".to_string()))?;
    let rows = match state.rows.get(model) {
        Some(rows) => rows,
        None => return Ok(Vec::new()),
    };

    let mut ids = Vec::new();
    'rows: for (id, row) in rows {
        for clause in clauses {
            if !clause_matches(*id, row, clause)? {
                continue 'rows;
            }
        }
        ids.push(*id);
    }
    Ok(ids)
}

fn clause_matches(id: i64, row: &Row, clause: &Value) -> Result<bool> {
    let triple = clause
        .as_array()
        .filter(|t| t.len() == 3)
        .ok_or_else(|| Error::Protocol(format!("bad domain clause {clause}")))?;
    let field = triple[0]
        .as_str()
        .ok_or_else(|| Error::Protocol(format!("bad domain field {}", triple[0])))?;
    let op = triple[1]
        .as_str()
        .ok_or_else(|| Error::Protocol(format!("bad domain operator {}", triple[1])))?;
    let expected = &triple[2];

    let actual = if field == "id" {
        json!(id)
    } else {
        row.get(field).cloned().unwrap_or(Value::Null)
    };

    let matched = match op {
        "=" | "==" => actual == *expected,
        "!=" | "<>" => actual != *expected,
        "in" => expected
            .as_array()
            .map(|set| set.contains(&actual))
            .unwrap_or(false),
        "not in" => expected
            .as_array()
            .map(|set| !set.contains(&actual))
            .unwrap_or(false),
        "like" => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(e)) => a.contains(e),
            _ => false,
        },
        "ilike" => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(e)) => a.to_lowercase().contains(&e.to_lowercase()),
            _ => false,
        },
        other => {
            return Err(Error::Protocol(format!("unsupported domain operator '{other}'")));
        }
    };
    Ok(matched)
}

fn read(state: &DbState, model: &str, args: &[Value]) -> Result<Value> {
    let ids_value = args.first().unwrap_or(&Value::Null);
    let ids = ids_arg(ids_value)?;
    let def = &state.models[model];

    let requested: Vec<String> = match args.get(1) {
        Some(Value::Array(fields)) => fields
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => def.fields.keys().cloned().collect(),
    };

    let mut out = Vec::new();
    for id in ids {
        let row = state
            .rows
            .get(model)
            .and_then(|rows| rows.get(&id))
            .ok_or_else(|| Error::Rpc(format!("no record {id} in {model}")))?;
        let mut result = Row::new();
        result.insert("id".to_string(), json!(id));
        for field in &requested {
            if let Some(fdef) = def.fields.get(field) {
                result.insert(field.clone(), state.serialized(fdef, row.get(field)));
            }
        }
        out.push(Value::Object(result));
    }

    // A scalar id in gets a bare mapping back, the way the server does it
    if ids_value.is_number() {
        Ok(out.into_iter().next().unwrap_or(Value::Bool(false)))
    } else {
        Ok(Value::Array(out))
    }
}
