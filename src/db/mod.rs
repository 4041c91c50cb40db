mod from_row;
mod schema;
pub mod queries;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::{init_audit_db, init_db};

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::crypto::MasterKey;
use crate::integrations::{GoogleClient, MercadoPagoClient, TwilioClient};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by all handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (companies, sellers, deals, metas, agendamentos, ...)
    pub db: DbPool,
    /// Audit log database pool (separate file to isolate growth)
    pub audit: DbPool,
    /// Master key for envelope encryption of OAuth tokens
    pub master_key: MasterKey,
    /// Public URL of this service
    pub base_url: String,
    /// Web app URL; OAuth and checkout flows land back there
    pub app_url: String,
    pub audit_log_enabled: bool,
    /// None when billing is not configured; checkout answers 503
    pub mercadopago: Option<Arc<MercadoPagoClient>>,
    /// None when the Google integration is not configured
    pub google: Option<Arc<GoogleClient>>,
    /// None when Twilio is not configured; the reminder task stays idle
    pub twilio: Option<Arc<TwilioClient>>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
