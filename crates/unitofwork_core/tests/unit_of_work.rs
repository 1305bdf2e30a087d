use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use unitofwork_core::{
    Customer, Order, RepoError, Session, SessionError, SqliteSession, UnitOfWork, UowError,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
enum FakeError {
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("close failed")]
    CloseFailed,
}

/// Session double that records calls and replays a scripted commit result.
#[derive(Default)]
struct CountingSession {
    calls: Arc<CallCounts>,
    commit_result: Option<Result<usize, FakeError>>,
    fail_close: bool,
}

#[derive(Default)]
struct CallCounts {
    commits: AtomicUsize,
    closes: AtomicUsize,
}

impl CountingSession {
    fn returning(result: Result<usize, FakeError>) -> (Self, Arc<CallCounts>) {
        let calls = Arc::new(CallCounts::default());
        let session = Self {
            calls: Arc::clone(&calls),
            commit_result: Some(result),
            fail_close: false,
        };
        (session, calls)
    }
}

#[async_trait]
impl Session for CountingSession {
    type Error = FakeError;

    async fn save_changes(&self) -> Result<usize, FakeError> {
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        self.commit_result.clone().unwrap_or(Ok(0))
    }

    fn close(self) -> Result<(), FakeError> {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(FakeError::CloseFailed);
        }
        Ok(())
    }
}

#[tokio::test]
async fn commit_without_changes_returns_zero() {
    let uow = UnitOfWork::new(SqliteSession::open_in_memory().unwrap());
    assert_eq!(uow.save_changes().await.unwrap(), 0);
}

#[test]
fn same_entity_type_returns_identical_repository() {
    let mut uow = UnitOfWork::new(SqliteSession::open_in_memory().unwrap());

    let first = uow.get_repository::<Order>().unwrap();
    let second = uow.get_repository::<Order>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(uow.cached_repository_count(), 1);
}

#[test]
fn distinct_entity_types_are_cached_independently() {
    let mut uow = UnitOfWork::new(SqliteSession::open_in_memory().unwrap());

    let orders = uow.get_repository::<Order>().unwrap();
    let customers = uow.get_repository::<Customer>().unwrap();

    assert!(uow.has_repository::<Order>());
    assert!(uow.has_repository::<Customer>());
    assert_eq!(uow.cached_repository_count(), 2);
    assert!(orders.is_attached());
    assert!(customers.is_attached());
}

#[test]
fn absent_session_fails_construction() {
    let result = UnitOfWork::<SqliteSession>::try_new(None);
    assert!(matches!(result, Err(UowError::MissingSession)));

    let result = UnitOfWork::<CountingSession>::try_new(None);
    assert!(matches!(result, Err(UowError::MissingSession)));
}

#[test]
fn present_session_constructs_active_unit_of_work() {
    let uow = UnitOfWork::try_new(Some(SqliteSession::open_in_memory().unwrap())).unwrap();
    assert!(!uow.is_disposed());
    assert!(!uow.context().unwrap().is_closed());
}

#[test]
fn dispose_twice_is_silent_and_closes_once() {
    let (session, calls) = CountingSession::returning(Ok(0));
    let mut uow = UnitOfWork::new(session);

    uow.dispose().unwrap();
    uow.dispose().unwrap();
    drop(uow);

    assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn reading_context_then_disposing_closes_once() {
    let (session, calls) = CountingSession::returning(Ok(0));
    let mut uow = UnitOfWork::new(session);

    let _ = uow.context().unwrap();
    assert_eq!(calls.closes.load(Ordering::SeqCst), 0);
    assert!(!uow.is_disposed());

    uow.dispose().unwrap();
    drop(uow);
    assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn held_repository_does_not_keep_session_from_closing() {
    let (session, calls) = CountingSession::returning(Ok(0));
    let mut uow = UnitOfWork::new(session);
    let orders = uow.get_repository::<Order>().unwrap();

    uow.dispose().unwrap();

    assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
    assert!(!orders.is_attached());
}

#[test]
fn drop_releases_session_exactly_once() {
    let (session, calls) = CountingSession::returning(Ok(0));
    {
        let _uow = UnitOfWork::new(session);
    }
    assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn close_failure_is_reported_once_then_dispose_is_silent() {
    let calls = Arc::new(CallCounts::default());
    let session = CountingSession {
        calls: Arc::clone(&calls),
        commit_result: None,
        fail_close: true,
    };
    let mut uow = UnitOfWork::new(session);

    let err = uow.dispose().unwrap_err();
    assert_eq!(err.into_session_error(), Some(FakeError::CloseFailed));
    uow.dispose().unwrap();
    assert!(uow.is_disposed());
    drop(uow);

    assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commit_delegates_once_and_passes_count_through() {
    let (session, calls) = CountingSession::returning(Ok(17));
    let uow = UnitOfWork::new(session);

    assert_eq!(uow.save_changes().await.unwrap(), 17);
    assert_eq!(calls.commits.load(Ordering::SeqCst), 1);

    assert_eq!(uow.save_changes().await.unwrap(), 17);
    assert_eq!(calls.commits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn commit_error_surfaces_unchanged_without_retry() {
    let original = FakeError::Constraint("orders.customer_id".to_string());
    let (session, calls) = CountingSession::returning(Err(original.clone()));
    let uow = UnitOfWork::new(session);

    let err = uow.save_changes().await.unwrap_err();
    assert_eq!(err.to_string(), original.to_string());
    assert_eq!(err.session_error(), Some(&original));
    assert_eq!(err.into_session_error(), Some(original));
    assert_eq!(calls.commits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_operation_fails_after_dispose() {
    let mut uow = UnitOfWork::new(SqliteSession::open_in_memory().unwrap());
    let customers = uow.get_repository::<Customer>().unwrap();
    uow.dispose().unwrap();

    assert!(uow.is_disposed());
    assert_eq!(uow.cached_repository_count(), 0);
    assert!(matches!(uow.context(), Err(UowError::Disposed)));
    assert!(matches!(
        uow.get_repository::<Customer>(),
        Err(UowError::Disposed)
    ));
    assert!(matches!(uow.save_changes().await, Err(UowError::Disposed)));

    assert!(!customers.is_attached());
    let err = customers
        .add(&Customer::new("Late", "late@example.com"))
        .unwrap_err();
    assert!(matches!(err, RepoError::Disposed));
    assert!(matches!(customers.count(), Err(RepoError::Disposed)));
}

#[tokio::test]
async fn sqlite_commit_error_is_the_session_error() {
    let mut uow = UnitOfWork::new(SqliteSession::open_in_memory().unwrap());
    let orders = uow.get_repository::<Order>().unwrap();
    orders.update(&Order::new(uuid::Uuid::new_v4(), 10)).unwrap();

    let err = uow.save_changes().await.unwrap_err();
    assert!(matches!(
        err.into_session_error(),
        Some(SessionError::ConcurrencyConflict {
            kind: "update",
            table: "orders",
            ..
        })
    ));
}
