use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Unexpected response shape: {0}")]
    Protocol(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Model '{0}' is not registered")]
    UnknownModel(String),

    #[error("Field '{0}' is not defined on model '{1}'")]
    UnknownField(String, String),

    #[error("A transaction is already active on this client")]
    TransactionActive,

    #[error("Transaction handle has already been stopped")]
    TransactionStopped,

    #[error("No database configured")]
    DatabaseNotConfigured,

    #[error("Database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    #[error("Wizard '{0}' must be created before execute")]
    WizardNotCreated(String),

    #[error("Database creation did not finish within {0:?}")]
    CreateTimeout(Duration),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
