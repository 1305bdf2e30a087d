//! Unit of work over one persistence session.
//!
//! # Responsibility
//! - Own one session for its whole lifetime and release it exactly once.
//! - Hand out one memoized repository per entity type.
//! - Expose a single atomic commit point (`save_changes`).
//!
//! # Invariants
//! - Lifecycle is Active -> Disposed, one way. Every operation after
//!   disposal fails with `UowError::Disposed`.
//! - Session errors are returned as `UowError::Session` carrying the
//!   original value; nothing is retried or reclassified.
//! - `get_repository` and `dispose` take `&mut self`, so neither can overlap
//!   a suspended `save_changes` on the same instance.

use crate::repo::Repository;
use crate::session::Session;
use log::{debug, warn};
use std::any::type_name;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

mod registry;

pub use registry::RepositoryCache;

pub type UowResult<T, E> = Result<T, UowError<E>>;

#[derive(Debug, Error)]
pub enum UowError<E> {
    #[error("a session is required to construct a unit of work")]
    MissingSession,
    #[error("unit of work has been disposed")]
    Disposed,
    #[error("failed to construct repository for entity `{entity}`")]
    RepositoryConstruction { entity: &'static str },
    #[error("session was still borrowed by a repository call and was released on drop")]
    SessionShared,
    #[error(transparent)]
    Session(E),
}

impl<E> UowError<E> {
    /// Returns the persistence error this value carries, if any.
    pub fn into_session_error(self) -> Option<E> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }

    pub fn session_error(&self) -> Option<&E> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}

pub struct UnitOfWork<S: Session> {
    session: Option<Arc<S>>,
    repositories: RepositoryCache,
}

impl<S: Session> UnitOfWork<S> {
    /// Takes ownership of an open session.
    pub fn new(session: S) -> Self {
        debug!(
            "event=uow_create module=uow status=ok session={}",
            type_name::<S>()
        );
        Self {
            session: Some(Arc::new(session)),
            repositories: RepositoryCache::new(),
        }
    }

    /// Takes ownership of a session that may be absent.
    ///
    /// # Errors
    /// - `MissingSession` when `session` is `None`; no unit of work is built.
    pub fn try_new(session: Option<S>) -> UowResult<Self, S::Error> {
        session.map(Self::new).ok_or(UowError::MissingSession)
    }

    /// Read access to the underlying session.
    ///
    /// Releasing the session stays with `dispose`; `Session::close` needs
    /// ownership and cannot be reached through this reference.
    pub fn context(&self) -> UowResult<&S, S::Error> {
        self.active_session().map(|session| session.as_ref())
    }

    /// Returns the repository for entity `T`, creating it on first request.
    ///
    /// Repeated calls for the same `T` return the identical instance.
    pub fn get_repository<T: 'static>(&mut self) -> UowResult<Arc<Repository<T, S>>, S::Error> {
        let Some(session) = self.session.as_ref() else {
            return Err(UowError::Disposed);
        };

        let created = !self.repositories.contains::<T>();
        let repository = self
            .repositories
            .get_or_insert_with::<T, _>(|| Repository::<T, S>::new(session))
            .ok_or(UowError::RepositoryConstruction {
                entity: type_name::<T>(),
            })?;

        if created {
            debug!(
                "event=repo_create module=uow status=ok entity={} cached={}",
                type_name::<T>(),
                self.repositories.len()
            );
        }
        Ok(repository)
    }

    /// Commits every change tracked by the session.
    ///
    /// Delegates exactly once to `Session::save_changes` and returns its
    /// affected-row count unchanged.
    pub async fn save_changes(&self) -> UowResult<usize, S::Error> {
        let session = self.active_session()?;
        let started_at = Instant::now();

        match session.save_changes().await {
            Ok(affected) => {
                debug!(
                    "event=save_changes module=uow status=ok duration_ms={} affected_rows={affected}",
                    started_at.elapsed().as_millis()
                );
                Ok(affected)
            }
            Err(err) => {
                debug!(
                    "event=save_changes module=uow status=error duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Err(UowError::Session(err))
            }
        }
    }

    /// Releases the session and drops every cached repository.
    ///
    /// Only the first call closes the session; later calls return `Ok(())`.
    ///
    /// # Errors
    /// - `Session` when `Session::close` fails. The unit of work is disposed
    ///   either way.
    /// - `SessionShared` when a repository call on another thread still holds
    ///   the session. `close` is skipped and the session is dropped by that
    ///   call when it returns.
    pub fn dispose(&mut self) -> UowResult<(), S::Error> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        let cached = self.repositories.len();
        self.repositories.clear();

        // Repositories hold only weak references, so this is the sole owner
        // unless a repository call is in flight.
        let session = Arc::try_unwrap(session).map_err(|_| UowError::SessionShared)?;
        session.close().map_err(UowError::Session)?;
        debug!("event=uow_dispose module=uow status=ok repositories={cached}");
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.session.is_none()
    }

    /// Whether a repository for `T` has already been created.
    pub fn has_repository<T: 'static>(&self) -> bool {
        self.repositories.contains::<T>()
    }

    pub fn cached_repository_count(&self) -> usize {
        self.repositories.len()
    }

    fn active_session(&self) -> UowResult<&Arc<S>, S::Error> {
        self.session.as_ref().ok_or(UowError::Disposed)
    }
}

impl<S: Session> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!("event=uow_dispose module=uow status=error trigger=drop error={err}");
        }
    }
}

impl<S: Session> Debug for UnitOfWork<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("session", &type_name::<S>())
            .field("disposed", &self.is_disposed())
            .field("repositories", &self.repositories)
            .finish()
    }
}
