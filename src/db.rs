use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::transaction::Client;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Create a database and wait for the server to finish building it
///
/// The create is asynchronous server-side; progress is polled at 1 s
/// intervals until it reaches exactly 1.0, bounded by the configured
/// `create_timeout`. `lang` and `user_password` fall back to the configured
/// language and `"admin"`.
pub fn create_database(
    client: &Client,
    name: &str,
    demo: bool,
    lang: Option<&str>,
    user_password: Option<&str>,
) -> Result<()> {
    let config = client.config();
    let lang = lang.unwrap_or(&config.language);
    let user_password = user_password.unwrap_or("admin");

    let token = client.service().db_create(name, demo, lang, user_password)?;
    info!(database = name, demo, lang, "database creation started");

    let deadline = Instant::now() + config.create_timeout;
    loop {
        let (progress, _users) = client.service().db_get_progress(&token)?;
        debug!(database = name, progress, "database creation in progress");
        if progress == 1.0 {
            info!(database = name, "database created");
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::CreateTimeout(config.create_timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Drop a database; a single synchronous call, no polling
pub fn drop_database(client: &Client, name: &str) -> Result<()> {
    client.service().db_drop(name)?;
    info!(database = name, "database dropped");
    Ok(())
}

/// Create a database and point the client at it
pub fn setup_database(client: &mut Client, name: &str, demo: bool) -> Result<()> {
    create_database(client, name, demo, None, None)?;
    client.set_database(name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ServerConfig;
    use crate::service::memory::InMemoryServer;

    fn client_with(server: Arc<InMemoryServer>) -> Client {
        Client::new(server, ServerConfig::new("/opt/openerp", "secret"))
    }

    #[test]
    fn test_create_polls_until_done() {
        let server = Arc::new(InMemoryServer::new());
        server.set_create_polls_required(1).unwrap();
        let client = client_with(server.clone());

        create_database(&client, "fresh_db", false, None, None).unwrap();
        assert!(server.has_database("fresh_db"));
    }

    #[test]
    fn test_create_times_out() {
        let server = Arc::new(InMemoryServer::new());
        // Never completes within the deadline
        server.set_create_polls_required(u32::MAX).unwrap();
        let mut config = ServerConfig::new("/opt/openerp", "secret");
        config.create_timeout = Duration::ZERO;
        let client = Client::new(server, config);

        assert!(matches!(
            create_database(&client, "slow_db", false, None, None).unwrap_err(),
            Error::CreateTimeout(_)
        ));
    }

    #[test]
    fn test_drop_database() {
        let server = Arc::new(InMemoryServer::new());
        server.add_database("doomed_db").unwrap();
        let client = client_with(server.clone());

        drop_database(&client, "doomed_db").unwrap();
        assert!(!server.has_database("doomed_db"));
    }

    #[test]
    fn test_setup_database_points_client_at_it() {
        let server = Arc::new(InMemoryServer::new());
        server.set_create_polls_required(1).unwrap();
        let mut client = client_with(server);

        setup_database(&mut client, "suite_db", true).unwrap();
        assert_eq!(client.config().database.as_deref(), Some("suite_db"));
        client.begin().unwrap().stop().unwrap();
    }
}
