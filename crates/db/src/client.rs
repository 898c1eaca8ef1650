use eyre::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

/// Tuned for the indexer's write pattern: a handful of tasks committing small
/// batch transactions while the API reads concurrently. WAL keeps readers off
/// the writers' lock, and NORMAL durability is enough because every batch can
/// be replayed from the chain. Foreign keys must be enforced per connection;
/// the reorg rollback relies on the cascades.
fn configure(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA wal_autocheckpoint = 1000;
         PRAGMA busy_timeout = 250;
         PRAGMA foreign_keys = ON;
         PRAGMA cache_size = -64000;",
    )
}

// Idempotent, applied in order on every connect
const MIGRATIONS: [&str; 3] = [
    include_str!("migrations/up-1-chain.sql"),
    include_str!("migrations/up-2-registry.sql"),
    include_str!("migrations/up-3-safe-history.sql"),
];

pub fn connect(url: &String) -> Result<Pool<SqliteConnectionManager>> {
    let pool = Pool::new(SqliteConnectionManager::file(url).with_init(configure))?;

    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    for migration in MIGRATIONS {
        tx.execute_batch(migration)?;
    }
    tx.commit()?;

    Ok(pool)
}
