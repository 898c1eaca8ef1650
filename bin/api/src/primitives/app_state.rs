use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use safescan_primitives::HttpRpcProvider;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    db: Pool<SqliteConnectionManager>,
    rpc: Arc<HttpRpcProvider>,
}

impl AppState {
    pub fn new(db: Pool<SqliteConnectionManager>, rpc: Arc<HttpRpcProvider>) -> Self {
        Self { db, rpc }
    }

    pub fn db(&self) -> &Pool<SqliteConnectionManager> {
        &self.db
    }

    pub fn rpc(&self) -> &HttpRpcProvider {
        &self.rpc
    }
}
