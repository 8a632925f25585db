//! Connection pool and transaction scopes.

use std::time::Duration;

use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use diesel::{Connection, PgConnection};

use crate::config::DatabaseConfig;
use crate::error::{ApiResult, AppError};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

/// Builds the pool without opening connections up front, so the service
/// starts (and reports not-ready) while the database is unreachable.
pub fn create_db_pool(config: &DatabaseConfig) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(&config.url);
    r2d2::Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(config.min_connections))
        .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
        .build_unchecked(manager)
}

pub fn create_db_pool_with_url(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(10)
        .connection_timeout(Duration::from_secs(10))
        .build_unchecked(manager)
}

/// Checks out one connection for the current request. It returns to the
/// pool when dropped.
pub fn get_db_conn(pool: &DbPool) -> ApiResult<DbConn> {
    pool.get().map_err(AppError::from)
}

/// Runs `f` in a read-write transaction: commit on `Ok`, rollback on `Err`.
pub fn transaction<T, F>(conn: &mut PgConnection, f: F) -> ApiResult<T>
where
    F: FnOnce(&mut PgConnection) -> ApiResult<T>,
{
    conn.transaction(f)
}

/// Runs `f` in a `READ ONLY` transaction.
pub fn read_only<T, F>(conn: &mut PgConnection, f: F) -> ApiResult<T>
where
    F: FnOnce(&mut PgConnection) -> ApiResult<T>,
{
    conn.build_transaction().read_only().run(f)
}
