//! Request-scoped database access.
//!
//! Every inbound request gets its own [`RequestScope`]. The scope checks out
//! at most one dedicated connection, lazily, the first time a query needs it,
//! and hands the same handle to every later query in that request. The
//! connection is a read-only transaction, so nothing issued through a scope
//! can modify the externally owned tables.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use sea_orm::{
    AccessMode, ConnectOptions, Database, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};
use tokio::sync::OnceCell;

use crate::common::AppState;
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Hands out request scopes backed by a bounded pool.
#[derive(Clone)]
pub struct ConnectionProvider {
    db: Arc<DatabaseConnection>,
}

impl ConnectionProvider {
    /// Open the pool described by `DATABASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connection` if the URL is invalid or the server is
    /// unreachable. There is no retry.
    pub async fn connect(config: &Config) -> AppResult<Self> {
        let mut options = ConnectOptions::new(config.database_url.clone());
        options
            .max_connections(config.db_max_connections)
            .sqlx_logging(false);

        let db = Database::connect(options)
            .await
            .map_err(|e| AppError::Connection(e.to_string()))?;
        Ok(Self { db: db.into() })
    }

    /// Wrap an existing connection (used by tests with a mock backend).
    #[must_use]
    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: db.into() }
    }

    /// Underlying pool, for startup tasks such as migrations.
    #[must_use]
    pub fn pool(&self) -> &DatabaseConnection {
        &self.db
    }

    #[must_use]
    pub fn scope(&self) -> RequestScope {
        RequestScope {
            db: Arc::clone(&self.db),
            conn: OnceCell::new(),
        }
    }
}

/// Explicit per-request database context.
///
/// Dropping a scope without calling [`RequestScope::release`] still returns
/// the connection: the transaction rolls back on drop.
pub struct RequestScope {
    db: Arc<DatabaseConnection>,
    conn: OnceCell<DatabaseTransaction>,
}

impl RequestScope {
    /// Return this scope's connection, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connection` if no connection can be obtained.
    pub async fn acquire(&self) -> AppResult<&DatabaseTransaction> {
        self.conn
            .get_or_try_init(|| async {
                tracing::debug!("Opening request-scoped connection");
                self.db
                    .begin_with_config(None, Some(AccessMode::ReadOnly))
                    .await
                    .map_err(|e| AppError::Connection(e.to_string()))
            })
            .await
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.initialized()
    }

    /// Close the connection if one was opened; otherwise a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Query` if the server rejects the rollback.
    pub async fn release(self) -> AppResult<()> {
        if let Some(tx) = self.conn.into_inner() {
            // Read-only transaction, nothing to commit.
            tx.rollback().await?;
            tracing::debug!("Released request-scoped connection");
        }
        Ok(())
    }
}

impl FromRequestParts<AppState> for RequestScope {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(state.db.scope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn provider() -> ConnectionProvider {
        ConnectionProvider::from_connection(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        )
    }

    #[tokio::test]
    async fn release_without_acquire_is_noop() {
        let scope = provider().scope();
        assert!(!scope.is_open());
        scope.release().await.unwrap();
    }

    #[tokio::test]
    async fn acquire_is_lazy_and_reused() {
        let scope = provider().scope();
        assert!(!scope.is_open());

        let first: *const DatabaseTransaction = scope.acquire().await.unwrap();
        assert!(scope.is_open());
        let second: *const DatabaseTransaction = scope.acquire().await.unwrap();
        assert_eq!(first, second);

        scope.release().await.unwrap();
    }

    #[tokio::test]
    async fn scopes_do_not_share_connections() {
        let provider = provider();
        let a = provider.scope();
        let b = provider.scope();

        let ca: *const DatabaseTransaction = a.acquire().await.unwrap();
        let cb: *const DatabaseTransaction = b.acquire().await.unwrap();
        assert_ne!(ca, cb);
    }

    #[tokio::test]
    async fn cloned_provider_shares_the_pool() {
        let provider = provider();
        let cloned = provider.clone();
        assert!(std::ptr::eq(provider.pool(), cloned.pool()));

        let a = provider.scope();
        let b = cloned.scope();
        a.acquire().await.unwrap();
        b.acquire().await.unwrap();
        assert!(a.is_open() && b.is_open());

        a.release().await.unwrap();
        b.release().await.unwrap();
    }
}
