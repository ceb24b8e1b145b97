//! High-level helpers for test suites: module installation and ready-made
//! in-memory fixtures.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::model::{Domain, Model};
use crate::service::memory::InMemoryServer;
use crate::transaction::Client;
use crate::wizard::Wizard;

/// Install the named modules, then run the server's upgrade step
///
/// Pre-6 servers drive the `module.upgrade` wizard; 6+ servers replaced it
/// with the `base.module.upgrade` osv_memory model, whose `upgrade_module`
/// accepts a null ids argument.
pub fn install_module(client: &Client, modules: &[&str]) -> Result<()> {
    let txn = client.begin()?;
    let module_obj = Model::open(&txn, "ir.module.module")?;

    let mut ids = Vec::new();
    for module in modules {
        let found = module_obj.search(&txn, &Domain::new().filter("name", "=", *module))?;
        if found.is_empty() {
            return Err(Error::ModuleNotFound((*module).to_string()));
        }
        ids.extend(found);
    }

    module_obj.call(&txn, "button_install", &[json!(ids)])?;
    info!(?modules, "modules scheduled for install");

    if client.config().version < 6 {
        txn.commit()?;
        txn.stop()?;
        let mut wizard = Wizard::new("module.upgrade")?;
        wizard.create(client, None)?;
        wizard.execute(client, None, Some("start"))?;
    } else {
        let upgrade = Model::open(&txn, "base.module.upgrade")?;
        upgrade.call(&txn, "upgrade_module", &[Value::Null])?;
        txn.commit()?;
        txn.stop()?;
    }
    Ok(())
}

/// An in-memory server with the canonical fixture schema loaded
///
/// Ships the models the stock installation would have: `res.partner` with
/// the usual relational fields, partner categories, the module registry and
/// the 6.x upgrade model. Tests build on this instead of repeating schema
/// setup.
pub fn demo_server(database: &str) -> Result<Arc<InMemoryServer>> {
    let server = InMemoryServer::new();
    server.add_database(database)?;
    server.define_model(
        database,
        "res.partner",
        &[
            ("name", "char", None),
            ("active", "boolean", None),
            ("parent_id", "many2one", Some("res.partner")),
            ("child_ids", "one2many", Some("res.partner")),
            ("category_id", "many2many", Some("res.partner.category")),
            ("doc_ref", "reference", None),
        ],
    )?;
    server.define_model(database, "res.partner.category", &[("name", "char", None)])?;
    server.define_model(
        database,
        "ir.module.module",
        &[("name", "char", None), ("state", "char", None)],
    )?;
    server.define_model(database, "base.module.upgrade", &[])?;

    for module in ["base", "product"] {
        server.seed(
            database,
            "ir.module.module",
            json!({"name": module, "state": "uninstalled"}),
        )?;
    }
    Ok(Arc::new(server))
}

/// A client wired to a [`demo_server`] database
pub fn demo_client(database: &str) -> Result<Client> {
    let server = demo_server(database)?;
    let config = ServerConfig::new("/opt/openerp", "admin")
        .database(database)
        .version(6);
    Ok(Client::new(server, config))
}
