//! Shared startup state for commands

use anyhow::Context;
use std::sync::Arc;

use crate::bybit::BybitClient;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::db::Database;
use crate::notify::TelegramNotifier;

/// Configuration and credentials resolved once per invocation
pub struct App {
    pub config: Config,
    pub credentials: Credentials,
    /// Where the configuration came from
    pub config_source: String,
}

impl App {
    /// Load the configuration file, falling back to the bundled example
    pub fn load(path: &str, testnet: bool, debug: bool) -> anyhow::Result<Self> {
        let (mut config, config_source) = match Config::load(path) {
            Ok(config) => (config, path.to_string()),
            Err(e) => {
                eprintln!("Warning: Could not load config from {}: {}", path, e);
                eprintln!("Using the bundled example configuration");
                (Config::example()?, "built-in example".to_string())
            }
        };
        config.apply_overrides(testnet, debug);
        let credentials = Credentials::load(&config.credentials.keys_file)?;
        Ok(Self {
            config,
            credentials,
            config_source,
        })
    }

    pub fn environment(&self) -> &'static str {
        self.config.exchange.environment()
    }

    /// REST client for the configured environment, journaling into `db` when given
    pub fn client(&self, db: Option<&Database>) -> anyhow::Result<BybitClient> {
        let credentials = self
            .credentials
            .bybit(self.config.exchange.testnet)
            .cloned();
        let client = BybitClient::new(&self.config.exchange, credentials)?;
        Ok(match db {
            Some(db) => client.with_journal(Arc::new(db.clone())),
            None => client,
        })
    }

    /// A client that must be able to sign requests
    pub fn private_client(&self, db: Option<&Database>) -> anyhow::Result<BybitClient> {
        let client = self.client(db)?;
        if !client.has_credentials() {
            anyhow::bail!(
                "no Bybit API keys for {}; set them in the environment or {}",
                self.environment(),
                self.config.credentials.keys_file.display()
            );
        }
        Ok(client)
    }

    pub async fn database(&self) -> anyhow::Result<Database> {
        let path = self.config.database_path();
        Database::open(&path, self.environment())
            .await
            .with_context(|| format!("opening database {}", path.display()))
    }

    pub fn notifier(&self) -> TelegramNotifier {
        TelegramNotifier::new(&self.config.telegram, self.credentials.telegram.as_ref())
    }
}
