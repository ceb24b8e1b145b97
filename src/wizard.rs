use serde_json::Value;

use crate::error::{Error, Result};
use crate::service::Context;
use crate::transaction::Client;

/// Proxy to a stateful multi-step wizard
///
/// Two-phase: `create` registers an instance server-side and captures its
/// id, `execute` runs a step against it. Executing before creating is an
/// error, as is creating without a configured database.
#[derive(Debug)]
pub struct Wizard {
    name: String,
    wiz_id: Option<u64>,
}

impl Wizard {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("wizard name cannot be empty".to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            wiz_id: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance id, once created
    pub fn wiz_id(&self) -> Option<u64> {
        self.wiz_id
    }

    /// Register an instance of this wizard, capturing its id
    pub fn create(&mut self, client: &Client, data: Option<Context>) -> Result<u64> {
        let config = client.config();
        let database = config
            .database
            .as_deref()
            .ok_or(Error::DatabaseNotConfigured)?;

        let wiz_id = client.service().wizard_create(
            database,
            config.user,
            &config.password,
            &self.name,
            &data.unwrap_or_default(),
        )?;
        self.wiz_id = Some(wiz_id);
        Ok(wiz_id)
    }

    /// Run one step; `data` defaults to an empty mapping, `action` to `"init"`
    pub fn execute(
        &self,
        client: &Client,
        data: Option<Context>,
        action: Option<&str>,
    ) -> Result<Value> {
        let wiz_id = self
            .wiz_id
            .ok_or_else(|| Error::WizardNotCreated(self.name.clone()))?;
        let config = client.config();
        let database = config
            .database
            .as_deref()
            .ok_or(Error::DatabaseNotConfigured)?;

        let context = config.context.clone().unwrap_or_default();
        client.service().wizard_execute(
            database,
            config.user,
            &config.password,
            wiz_id,
            &data.unwrap_or_default(),
            action.unwrap_or("init"),
            &context,
        )
    }
}
