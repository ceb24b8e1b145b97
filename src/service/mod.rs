pub mod http;
pub mod memory;

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::Result;

/// Call context forwarded with every ORM call (language, timezone, ...)
pub type Context = Map<String, Value>;

/// Handle to one open server-side cursor
pub type CursorId = u64;

/// Declared type of an ORM field, as the server reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Many2One,
    One2One,
    One2Many,
    Many2Many,
    Reference,
    /// Any non-relational type; the raw read value passes through unchanged
    Scalar(String),
}

impl FieldType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "many2one" => FieldType::Many2One,
            "one2one" => FieldType::One2One,
            "one2many" => FieldType::One2Many,
            "many2many" => FieldType::Many2Many,
            "reference" => FieldType::Reference,
            other => FieldType::Scalar(other.to_string()),
        }
    }
}

/// Field metadata needed to resolve relational reads
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub ftype: FieldType,
    /// Target model for relational fields
    pub relation: Option<String>,
}

/// The server serializes every empty value as boolean `false`, whatever the
/// declared field type; this mirrors that test.
pub(crate) fn value_is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Boundary to the external server's object/wizard/database services
///
/// A small capability surface covers the lifecycle pieces the harness
/// manages itself (cursors, wizards, databases); `execute` is the generic
/// escape hatch that carries `create`/`search`/`read`/`write` and any
/// long-tail model method by name.
pub trait OrmService: Send + Sync {
    /// Open a cursor on the named database
    fn open_cursor(&self, database: &str) -> Result<CursorId>;

    /// Commit whatever the cursor has pending; the cursor stays open
    fn commit(&self, cursor: CursorId) -> Result<()>;

    /// Close the cursor, discarding uncommitted work
    fn close_cursor(&self, cursor: CursorId) -> Result<()>;

    /// Whether a model name is registered on the cursor's database
    fn model_exists(&self, cursor: CursorId, model: &str) -> Result<bool>;

    /// Field metadata for a model, own and inherited columns together
    fn fields_get(
        &self,
        cursor: CursorId,
        uid: u32,
        model: &str,
    ) -> Result<HashMap<String, FieldDescriptor>>;

    /// Invoke a named model method with cursor, user and context bound
    fn execute(
        &self,
        cursor: CursorId,
        uid: u32,
        model: &str,
        method: &str,
        args: &[Value],
        context: &Context,
    ) -> Result<Value>;

    /// Register a wizard instance, returning its id
    fn wizard_create(
        &self,
        database: &str,
        uid: u32,
        password: &str,
        name: &str,
        data: &Context,
    ) -> Result<u64>;

    /// Run one wizard step
    fn wizard_execute(
        &self,
        database: &str,
        uid: u32,
        password: &str,
        wiz_id: u64,
        data: &Context,
        action: &str,
        context: &Context,
    ) -> Result<Value>;

    /// Start an asynchronous database create; returns the progress token
    fn db_create(&self, name: &str, demo: bool, lang: &str, user_password: &str) -> Result<Value>;

    /// Poll a pending create: (progress in 0.0..=1.0, created users)
    fn db_get_progress(&self, token: &Value) -> Result<(f64, Value)>;

    /// Drop a database
    fn db_drop(&self, name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_parse() {
        assert_eq!(FieldType::parse("many2one"), FieldType::Many2One);
        assert_eq!(FieldType::parse("one2many"), FieldType::One2Many);
        assert_eq!(FieldType::parse("reference"), FieldType::Reference);
        assert_eq!(FieldType::parse("char"), FieldType::Scalar("char".to_string()));
    }
}
