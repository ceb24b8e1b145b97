/// Model/Record/Wizard proxy tests
///
/// End-to-end checks of the forwarding layer: create-read round trips,
/// relational field expansion, the empty-reads-as-false contract, ordering
/// of search results, and the wizard two-phase flow.
/// Run with: cargo test --test proxy_tests
use erptest::testing::demo_client;
use erptest::{Domain, Error, Model, Record, Wizard};
use serde_json::json;

#[test]
fn test_create_then_read_back_through_record() {
    let client = demo_client("test_db").unwrap();
    let txn = client.begin().unwrap();
    let partner = Model::open(&txn, "res.partner").unwrap();

    let id = partner
        .create(&txn, json!({"name": "Sharoon Thomas"}))
        .unwrap();
    let record = partner.browse(id);
    assert_eq!(record.get_str(&txn, "name").unwrap(), "Sharoon Thomas");
    txn.stop().unwrap();
}

#[test]
fn test_unknown_model_is_rejected() {
    let client = demo_client("test_db").unwrap();
    let txn = client.begin().unwrap();
    assert!(matches!(
        Model::open(&txn, "res.nonexistent").unwrap_err(),
        Error::UnknownModel(_)
    ));
    txn.stop().unwrap();
}

#[test]
fn test_falsy_relational_field_is_false_not_empty() {
    let client = demo_client("test_db").unwrap();
    let txn = client.begin().unwrap();
    let partner = Model::open(&txn, "res.partner").unwrap();

    let id = partner.create(&txn, json!({"name": "Loner"})).unwrap();
    let value = partner.browse(id).get(&txn, "category_id").unwrap();

    assert!(value.is_false());
    assert!(value.into_records().is_none());
    txn.stop().unwrap();
}

#[test]
fn test_many2one_resolves_to_target_record() {
    let client = demo_client("test_db").unwrap();
    let txn = client.begin().unwrap();
    let partner = Model::open(&txn, "res.partner").unwrap();

    let company = partner.create(&txn, json!({"name": "Openlabs"})).unwrap();
    let employee = partner
        .create(&txn, json!({"name": "Employee", "parent_id": company}))
        .unwrap();

    let resolved = partner
        .browse(employee)
        .get(&txn, "parent_id")
        .unwrap()
        .into_record()
        .unwrap();
    assert_eq!(resolved.id(), company);
    assert_eq!(resolved.model().name(), "res.partner");
    txn.stop().unwrap();
}

#[test]
fn test_many2many_resolves_each_id() {
    let client = demo_client("test_db").unwrap();
    let txn = client.begin().unwrap();
    let partner = Model::open(&txn, "res.partner").unwrap();
    let category = Model::open(&txn, "res.partner.category").unwrap();

    let gold = category.create(&txn, json!({"name": "Gold"})).unwrap();
    let oem = category.create(&txn, json!({"name": "OEM"})).unwrap();
    let id = partner
        .create(&txn, json!({"name": "Tagged", "category_id": [gold, oem]}))
        .unwrap();

    let tags = partner
        .browse(id)
        .get(&txn, "category_id")
        .unwrap()
        .into_records()
        .unwrap();
    let ids: Vec<i64> = tags.iter().map(Record::id).collect();
    assert_eq!(ids, vec![gold, oem]);
    assert_eq!(tags[0].model().name(), "res.partner.category");
    txn.stop().unwrap();
}

#[test]
fn test_find_returns_records_in_search_order() {
    let client = demo_client("test_db").unwrap();
    let txn = client.begin().unwrap();
    let partner = Model::open(&txn, "res.partner").unwrap();

    for name in ["First", "Second", "Third"] {
        partner.create(&txn, json!({"name": name})).unwrap();
    }

    let domain = Domain::new().filter("name", "ilike", "i");
    let searched = partner.search(&txn, &domain).unwrap();
    let found: Vec<i64> = partner
        .find(&txn, &domain)
        .unwrap()
        .iter()
        .map(Record::id)
        .collect();
    assert_eq!(found, searched);
    txn.stop().unwrap();
}

#[test]
fn test_record_reads_are_fresh() {
    let client = demo_client("test_db").unwrap();
    let txn = client.begin().unwrap();
    let partner = Model::open(&txn, "res.partner").unwrap();

    let id = partner.create(&txn, json!({"name": "Before"})).unwrap();
    let record = partner.browse(id);
    assert_eq!(record.get_str(&txn, "name").unwrap(), "Before");

    partner.write(&txn, &[id], json!({"name": "After"})).unwrap();
    // No caching in the proxy: the next read sees the write
    assert_eq!(record.get_str(&txn, "name").unwrap(), "After");
    txn.stop().unwrap();
}

#[test]
fn test_wizard_two_phase_flow() {
    let client = demo_client("test_db").unwrap();

    let mut wizard = Wizard::new("module.upgrade").unwrap();
    assert!(matches!(
        wizard.execute(&client, None, None).unwrap_err(),
        Error::WizardNotCreated(_)
    ));

    wizard.create(&client, None).unwrap();
    let result = wizard.execute(&client, None, Some("start")).unwrap();
    assert_eq!(result["action"], "start");
}
