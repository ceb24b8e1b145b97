use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::service::{Context, CursorId, OrmService};

/// Entry point: a configured connection to one server
///
/// Owns the service handle and the configuration; transactions are explicit
/// handles obtained from here and passed by parameter, never ambient state.
/// At most one transaction may be active per client at a time.
pub struct Client {
    service: Arc<dyn OrmService>,
    config: ServerConfig,
    in_transaction: AtomicBool,
}

impl Client {
    pub fn new(service: Arc<dyn OrmService>, config: ServerConfig) -> Self {
        Self {
            service,
            config,
            in_transaction: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<dyn OrmService> {
        &self.service
    }

    /// Point this client at another database
    pub fn set_database(&mut self, database: &str) {
        self.config.database = Some(database.to_string());
    }

    /// Start a transaction as the configured user
    pub fn begin(&self) -> Result<Transaction<'_>> {
        self.begin_as(self.config.user, self.config.context.clone())
    }

    /// Start a transaction as a specific user
    ///
    /// Fails with [`Error::TransactionActive`] while another transaction from
    /// this client is still open. The context falls back to the acting
    /// user's stored preferences (`res.users.context_get`) when neither the
    /// argument nor the configuration provides one.
    pub fn begin_as(&self, user: u32, context: Option<Context>) -> Result<Transaction<'_>> {
        let database = self
            .config
            .database
            .clone()
            .ok_or(Error::DatabaseNotConfigured)?;

        if self
            .in_transaction
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::TransactionActive);
        }

        let cursor = match self.service.open_cursor(&database) {
            Ok(cursor) => cursor,
            Err(e) => {
                self.in_transaction.store(false, Ordering::Release);
                return Err(e);
            }
        };

        let context = match context {
            Some(context) => Ok(context),
            None => self.default_context(cursor, user),
        };
        let context = match context {
            Ok(context) => context,
            Err(e) => {
                let _ = self.service.close_cursor(cursor);
                self.in_transaction.store(false, Ordering::Release);
                return Err(e);
            }
        };

        debug!(database, user, cursor, "transaction started");
        Ok(Transaction {
            client: self,
            database,
            cursor,
            user,
            context,
            stopped: false,
        })
    }

    /// Load the acting user's stored preference context
    fn default_context(&self, cursor: CursorId, user: u32) -> Result<Context> {
        let value = self
            .service
            .execute(cursor, user, "res.users", "context_get", &[], &Context::new())?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(Error::Protocol(format!("context_get returned {other}"))),
        }
    }
}

/// One open cursor bound to a user and a context
///
/// The handle is consumed by [`Transaction::stop`]; dropping it without
/// stopping still releases the cursor, so a panicking test cannot leak one.
pub struct Transaction<'a> {
    client: &'a Client,
    database: String,
    cursor: CursorId,
    user: u32,
    context: Context,
    stopped: bool,
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("database", &self.database)
            .field("cursor", &self.cursor)
            .field("user", &self.user)
            .field("context", &self.context)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Transaction<'_> {
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn cursor(&self) -> CursorId {
        self.cursor
    }

    pub fn user(&self) -> u32 {
        self.user
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn auto_commit(&self) -> bool {
        self.client.config.auto_commit
    }

    /// Invoke a named model method with cursor, user and context bound
    pub fn call(&self, model: &str, method: &str, args: &[Value]) -> Result<Value> {
        if self.stopped {
            return Err(Error::TransactionStopped);
        }
        self.client
            .service
            .execute(self.cursor, self.user, model, method, args, &self.context)
    }

    pub(crate) fn service(&self) -> &Arc<dyn OrmService> {
        &self.client.service
    }

    /// Commit the cursor; the transaction stays open
    pub fn commit(&self) -> Result<()> {
        if self.stopped {
            return Err(Error::TransactionStopped);
        }
        self.client.service.commit(self.cursor)
    }

    /// End the transaction: close the cursor and release the client's slot
    pub fn stop(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        let result = self.client.service.close_cursor(self.cursor);
        self.client.in_transaction.store(false, Ordering::Release);
        debug!(cursor = self.cursor, "transaction stopped");
        result
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            if let Err(e) = self.release() {
                warn!(cursor = self.cursor, "failed to release cursor on drop: {e}");
            }
        }
    }
}
