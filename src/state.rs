use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared application state, constructed once in `main` and injected into
/// every handler. Nothing in the crate holds a global client.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
}
