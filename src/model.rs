use std::collections::HashMap;

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::service::FieldDescriptor;
use crate::transaction::Transaction;

/// Search criteria: an ordered list of `(field, operator, value)` triples
///
/// The semantics are the server's own query language; this is only the
/// builder and the wire shape.
#[derive(Debug, Clone, Default)]
pub struct Domain(Vec<(String, String, Value)>);

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one `(field, operator, value)` clause
    pub fn filter(mut self, field: &str, op: &str, value: impl Into<Value>) -> Self {
        self.0.push((field.to_string(), op.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|(field, op, value)| json!([field, op, value]))
                .collect(),
        )
    }
}

/// Proxy to one registered model
///
/// Construction validates the name against the registry and pulls the field
/// metadata [`Record`] needs to resolve relational reads. The named wrappers
/// each bind the transaction's cursor, user and context onto the
/// identically-named server method; [`Model::call`] carries everything else.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    fields: HashMap<String, FieldDescriptor>,
}

impl Model {
    /// Look up a model by name; fails if it is not registered
    pub fn open(txn: &Transaction<'_>, name: &str) -> Result<Self> {
        if !txn.service().model_exists(txn.cursor(), name)? {
            return Err(Error::UnknownModel(name.to_string()));
        }
        let fields = txn.service().fields_get(txn.cursor(), txn.user(), name)?;
        Ok(Self {
            name: name.to_string(),
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field metadata, own and inherited columns together
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    /// Search and wrap every match, preserving the server's result order
    pub fn find(&self, txn: &Transaction<'_>, domain: &Domain) -> Result<Vec<Record>> {
        let ids = self.search(txn, domain)?;
        Ok(ids.into_iter().map(|id| Record::new(self.clone(), id)).collect())
    }

    /// Wrap a single id without touching the server
    pub fn browse(&self, id: i64) -> Record {
        Record::new(self.clone(), id)
    }

    pub fn create(&self, txn: &Transaction<'_>, values: Value) -> Result<i64> {
        let result = self.call_mutating(txn, "create", &[values])?;
        result
            .as_i64()
            .ok_or_else(|| Error::Protocol(format!("create returned {result}")))
    }

    pub fn search(&self, txn: &Transaction<'_>, domain: &Domain) -> Result<Vec<i64>> {
        let result = txn.call(&self.name, "search", &[domain.to_value()])?;
        ids_from(&result)
    }

    pub fn search_count(&self, txn: &Transaction<'_>, domain: &Domain) -> Result<u64> {
        let result = txn.call(&self.name, "search_count", &[domain.to_value()])?;
        result
            .as_u64()
            .ok_or_else(|| Error::Protocol(format!("search_count returned {result}")))
    }

    /// Read the given fields for a set of ids
    pub fn read(&self, txn: &Transaction<'_>, ids: &[i64], fields: &[&str]) -> Result<Value> {
        txn.call(&self.name, "read", &[json!(ids), json!(fields)])
    }

    /// Read the given fields for one id, returning the bare mapping
    pub fn read_one(
        &self,
        txn: &Transaction<'_>,
        id: i64,
        fields: &[&str],
    ) -> Result<serde_json::Map<String, Value>> {
        let result = txn.call(&self.name, "read", &[json!(id), json!(fields)])?;
        match result {
            Value::Object(map) => Ok(map),
            other => Err(Error::Protocol(format!("read returned {other}"))),
        }
    }

    pub fn write(&self, txn: &Transaction<'_>, ids: &[i64], values: Value) -> Result<()> {
        self.call_mutating(txn, "write", &[json!(ids), values])?;
        Ok(())
    }

    pub fn unlink(&self, txn: &Transaction<'_>, ids: &[i64]) -> Result<()> {
        self.call_mutating(txn, "unlink", &[json!(ids)])?;
        Ok(())
    }

    pub fn copy(&self, txn: &Transaction<'_>, id: i64, defaults: Option<Value>) -> Result<i64> {
        let args = vec![json!(id), defaults.unwrap_or(Value::Null)];
        let result = self.call_mutating(txn, "copy", &args)?;
        result
            .as_i64()
            .ok_or_else(|| Error::Protocol(format!("copy returned {result}")))
    }

    pub fn name_get(&self, txn: &Transaction<'_>, ids: &[i64]) -> Result<Vec<(i64, String)>> {
        let result = txn.call(&self.name, "name_get", &[json!(ids)])?;
        let pairs = result
            .as_array()
            .ok_or_else(|| Error::Protocol(format!("name_get returned {result}")))?;
        pairs
            .iter()
            .map(|pair| {
                let id = pair.get(0).and_then(Value::as_i64);
                let name = pair.get(1).and_then(Value::as_str);
                match (id, name) {
                    (Some(id), Some(name)) => Ok((id, name.to_string())),
                    _ => Err(Error::Protocol(format!("bad name_get pair {pair}"))),
                }
            })
            .collect()
    }

    /// Generic escape hatch for the long tail of model methods
    pub fn call(&self, txn: &Transaction<'_>, method: &str, args: &[Value]) -> Result<Value> {
        txn.call(&self.name, method, args)
    }

    /// Forward a mutating method, committing right away under auto-commit
    fn call_mutating(&self, txn: &Transaction<'_>, method: &str, args: &[Value]) -> Result<Value> {
        let result = txn.call(&self.name, method, args)?;
        if txn.auto_commit() {
            txn.commit()?;
        }
        Ok(result)
    }
}

fn ids_from(value: &Value) -> Result<Vec<i64>> {
    value
        .as_array()
        .ok_or_else(|| Error::Protocol(format!("expected an id list, got {value}")))?
        .iter()
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| Error::Protocol(format!("bad record id {v}")))
        })
        .collect()
}
