pub mod api;
pub mod config;
pub mod crypto;
pub mod db;

pub use db::DbPool;

use config::Config;
use crypto::SessionAuthenticator;

/// Shared, read-only state handed to every request handler.
pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub authenticator: SessionAuthenticator,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let authenticator = SessionAuthenticator::new(&config.auth);
        Self {
            config,
            db,
            authenticator,
        }
    }
}
