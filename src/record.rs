use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::service::{FieldType, value_is_falsy};
use crate::transaction::Transaction;

/// A resolved field read
#[derive(Debug)]
pub enum FieldValue {
    /// Scalar value, or `false` for anything the server serialized as empty
    Raw(Value),
    /// many2one / one2one / reference target
    One(Record),
    /// one2many / many2many targets, in server order
    Many(Vec<Record>),
}

impl FieldValue {
    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            FieldValue::Raw(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            FieldValue::One(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            FieldValue::Many(records) => Some(records),
            _ => None,
        }
    }

    /// Whether this is the server's empty-value marker
    pub fn is_false(&self) -> bool {
        matches!(self, FieldValue::Raw(Value::Bool(false)))
    }
}

/// Proxy to a single row of a model
///
/// Stateless beyond the id: every [`Record::get`] is a fresh single-field
/// read, and relational fields expand into nested proxies. An empty value of
/// any declared type reads as `false` — the server serializes empty
/// relations that way, and existing suites depend on it, so it is preserved
/// rather than normalized to an empty list.
#[derive(Debug, Clone)]
pub struct Record {
    model: Model,
    id: i64,
}

impl Record {
    pub(crate) fn new(model: Model, id: i64) -> Self {
        Self { model, id }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Read one field and resolve it per its declared type
    pub fn get(&self, txn: &Transaction<'_>, field: &str) -> Result<FieldValue> {
        let descriptor = self
            .model
            .field(field)
            .ok_or_else(|| Error::UnknownField(field.to_string(), self.model.name().to_string()))?
            .clone();

        let row = self.model.read_one(txn, self.id, &[field])?;
        let value = row
            .get(field)
            .ok_or_else(|| Error::UnknownField(field.to_string(), self.model.name().to_string()))?
            .clone();

        if value_is_falsy(&value) {
            return Ok(FieldValue::Raw(Value::Bool(false)));
        }

        match descriptor.ftype {
            FieldType::Many2One | FieldType::One2One => {
                let target = self.relation_model(txn, &descriptor.relation, field)?;
                let id = value
                    .get(0)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| Error::Protocol(format!("bad relational value {value}")))?;
                Ok(FieldValue::One(Record::new(target, id)))
            }
            FieldType::One2Many | FieldType::Many2Many => {
                let target = self.relation_model(txn, &descriptor.relation, field)?;
                let ids = value
                    .as_array()
                    .ok_or_else(|| Error::Protocol(format!("bad relational value {value}")))?;
                let records = ids
                    .iter()
                    .map(|id| {
                        id.as_i64()
                            .map(|id| Record::new(target.clone(), id))
                            .ok_or_else(|| Error::Protocol(format!("bad record id {id}")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(FieldValue::Many(records))
            }
            FieldType::Reference => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| Error::Protocol(format!("bad reference value {value}")))?;
                let (model, id) = raw
                    .split_once(',')
                    .ok_or_else(|| Error::Protocol(format!("bad reference value '{raw}'")))?;
                let id: i64 = id
                    .trim()
                    .parse()
                    .map_err(|_| Error::Protocol(format!("bad reference id '{raw}'")))?;
                let target = Model::open(txn, model)?;
                Ok(FieldValue::One(Record::new(target, id)))
            }
            FieldType::Scalar(_) => Ok(FieldValue::Raw(value)),
        }
    }

    /// String field, erroring on anything else
    pub fn get_str(&self, txn: &Transaction<'_>, field: &str) -> Result<String> {
        match self.get(txn, field)? {
            FieldValue::Raw(Value::String(s)) => Ok(s),
            other => Err(Error::Protocol(format!(
                "field '{field}' is not a string: {other:?}"
            ))),
        }
    }

    /// Integer field, erroring on anything else
    pub fn get_i64(&self, txn: &Transaction<'_>, field: &str) -> Result<i64> {
        match self.get(txn, field)? {
            FieldValue::Raw(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| Error::Protocol(format!("field '{field}' is not an integer: {n}"))),
            other => Err(Error::Protocol(format!(
                "field '{field}' is not an integer: {other:?}"
            ))),
        }
    }

    /// Boolean field; the empty marker reads as `false`
    pub fn get_bool(&self, txn: &Transaction<'_>, field: &str) -> Result<bool> {
        match self.get(txn, field)? {
            FieldValue::Raw(Value::Bool(b)) => Ok(b),
            other => Err(Error::Protocol(format!(
                "field '{field}' is not a boolean: {other:?}"
            ))),
        }
    }

    fn relation_model(
        &self,
        txn: &Transaction<'_>,
        relation: &Option<String>,
        field: &str,
    ) -> Result<Model> {
        let name = relation.as_deref().ok_or_else(|| {
            Error::Protocol(format!(
                "relational field '{field}' on '{}' has no target model",
                self.model.name()
            ))
        })?;
        Model::open(txn, name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::ServerConfig;
    use crate::service::memory::InMemoryServer;
    use crate::transaction::Client;

    fn client() -> Client {
        let server = InMemoryServer::new();
        server.add_database("test_db").unwrap();
        server
            .define_model(
                "test_db",
                "res.partner",
                &[
                    ("name", "char", None),
                    ("active", "boolean", None),
                    ("parent_id", "many2one", Some("res.partner")),
                    ("child_ids", "one2many", Some("res.partner")),
                    ("doc_ref", "reference", None),
                ],
            )
            .unwrap();
        Client::new(
            Arc::new(server),
            ServerConfig::new("/opt/openerp", "secret").database("test_db"),
        )
    }

    #[test]
    fn test_scalar_read() {
        let client = client();
        let txn = client.begin().unwrap();
        let partner = Model::open(&txn, "res.partner").unwrap();
        let id = partner.create(&txn, json!({"name": "Sharoon Thomas"})).unwrap();

        let record = partner.browse(id);
        assert_eq!(record.get_str(&txn, "name").unwrap(), "Sharoon Thomas");
        txn.stop().unwrap();
    }

    #[test]
    fn test_unknown_field() {
        let client = client();
        let txn = client.begin().unwrap();
        let partner = Model::open(&txn, "res.partner").unwrap();
        let id = partner.create(&txn, json!({"name": "X"})).unwrap();

        let err = partner.browse(id).get(&txn, "no_such_field").unwrap_err();
        assert!(matches!(err, Error::UnknownField(_, _)));
        txn.stop().unwrap();
    }

    #[test]
    fn test_empty_relation_reads_as_false() {
        let client = client();
        let txn = client.begin().unwrap();
        let partner = Model::open(&txn, "res.partner").unwrap();
        let id = partner.create(&txn, json!({"name": "Lonely"})).unwrap();

        let value = partner.browse(id).get(&txn, "child_ids").unwrap();
        assert!(value.is_false());
        // Never an empty sequence
        assert!(value.into_records().is_none());
        txn.stop().unwrap();
    }

    #[test]
    fn test_many2one_resolves_to_record() {
        let client = client();
        let txn = client.begin().unwrap();
        let partner = Model::open(&txn, "res.partner").unwrap();
        let parent = partner.create(&txn, json!({"name": "Parent"})).unwrap();
        let child = partner
            .create(&txn, json!({"name": "Child", "parent_id": parent}))
            .unwrap();

        let resolved = partner
            .browse(child)
            .get(&txn, "parent_id")
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(resolved.id(), parent);
        assert_eq!(resolved.model().name(), "res.partner");
        assert_eq!(resolved.get_str(&txn, "name").unwrap(), "Parent");
        txn.stop().unwrap();
    }

    #[test]
    fn test_one2many_resolves_in_order() {
        let client = client();
        let txn = client.begin().unwrap();
        let partner = Model::open(&txn, "res.partner").unwrap();
        let a = partner.create(&txn, json!({"name": "A"})).unwrap();
        let b = partner.create(&txn, json!({"name": "B"})).unwrap();
        let parent = partner
            .create(&txn, json!({"name": "Parent", "child_ids": [a, b]}))
            .unwrap();

        let children = partner
            .browse(parent)
            .get(&txn, "child_ids")
            .unwrap()
            .into_records()
            .unwrap();
        let ids: Vec<i64> = children.iter().map(Record::id).collect();
        assert_eq!(ids, vec![a, b]);
        txn.stop().unwrap();
    }

    #[test]
    fn test_reference_resolves_named_model() {
        let client = client();
        let txn = client.begin().unwrap();
        let partner = Model::open(&txn, "res.partner").unwrap();
        let target = partner.create(&txn, json!({"name": "Target"})).unwrap();
        let holder = partner
            .create(
                &txn,
                json!({"name": "Holder", "doc_ref": format!("res.partner,{target}")}),
            )
            .unwrap();

        let resolved = partner
            .browse(holder)
            .get(&txn, "doc_ref")
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(resolved.id(), target);
        assert_eq!(resolved.model().name(), "res.partner");
        txn.stop().unwrap();
    }

    #[test]
    fn test_falsy_scalar_reads_as_false() {
        let client = client();
        let txn = client.begin().unwrap();
        let partner = Model::open(&txn, "res.partner").unwrap();
        let id = partner
            .create(&txn, json!({"name": "X", "active": false}))
            .unwrap();

        assert!(partner.browse(id).get(&txn, "active").unwrap().is_false());
        txn.stop().unwrap();
    }
}
