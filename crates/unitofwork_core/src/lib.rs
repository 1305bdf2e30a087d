//! Unit-of-work core: one session, memoized repositories, one commit point.
//!
//! Typical flow: open a `SqliteSession`, wrap it in a `UnitOfWork`, stage
//! changes through `get_repository::<T>()`, then `save_changes().await`.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod session;
pub mod uow;

pub use config::{ConfigError, CoreConfig, DbConfig, LogConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::customer::{Customer, CustomerId};
pub use model::order::{Order, OrderId, OrderStatus};
pub use model::ValidationError;
pub use repo::{Entity, ListQuery, RepoError, RepoResult, Repository};
pub use session::{Session, SessionError, SessionResult, SqliteSession};
pub use uow::{UnitOfWork, UowError, UowResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
