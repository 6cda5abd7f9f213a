//! Fault injection for exercising callers' error handling.
//!
//! A [`Faults`] handle holds at most one predicate per operation (get, add, count).
//! Before the operation runs, the repository consults the predicate; if it returns
//! `true`, the operation fails with [`RepositoryError::Injected`] carrying the
//! configured status code and message, and the store is left untouched.
//!
//! ```ignore
//! let repo = InMemoryRepository::<Order>::new();
//!
//! repo.faults()
//!     .fail_get(|id| id == "o-1", StatusCode::TOO_MANY_REQUESTS, Some("throttled"))
//!     .await;
//!
//! let err = repo.get("o-1", RequestOptions::new()).await.unwrap_err();
//! assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
//! ```

use mea::rwlock::RwLock;
use std::{fmt, sync::Arc};
use tracing::warn;

use docrepo_core::error::{RepositoryError, RepositoryResult, StatusCode};

struct Fault<P: ?Sized> {
    predicate: Arc<P>,
    status: StatusCode,
    message: String,
}

impl<P: ?Sized> Fault<P> {
    fn error(&self) -> RepositoryError {
        RepositoryError::Injected {
            status: self.status,
            message: self.message.clone(),
        }
    }
}

type GetPredicate = dyn Fn(&str) -> bool + Send + Sync;
type AddPredicate<T> = dyn Fn(&T) -> bool + Send + Sync;
type CountPredicate = dyn Fn() -> bool + Send + Sync;

struct FaultTable<T> {
    get: Option<Fault<GetPredicate>>,
    add: Option<Fault<AddPredicate<T>>>,
    count: Option<Fault<CountPredicate>>,
}

impl<T> Default for FaultTable<T> {
    fn default() -> Self {
        Self { get: None, add: None, count: None }
    }
}

fn message_or_default(message: Option<&str>, operation: &str) -> String {
    message
        .map(str::to_string)
        .unwrap_or_else(|| format!("injected {operation} failure"))
}

/// Registered fault predicates of one repository.
///
/// Cloning the handle shares the registrations.
pub struct Faults<T> {
    table: Arc<RwLock<FaultTable<T>>>,
}

impl<T> Clone for Faults<T> {
    fn clone(&self) -> Self {
        Self { table: Arc::clone(&self.table) }
    }
}

impl<T> Default for Faults<T> {
    fn default() -> Self {
        Self { table: Arc::new(RwLock::new(FaultTable::default())) }
    }
}

impl<T> fmt::Debug for Faults<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Faults").finish_non_exhaustive()
    }
}

impl<T> Faults<T> {
    /// Fails every get whose id matches `predicate`, replacing any previous get fault.
    pub async fn fail_get(
        &self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
        status: impl Into<StatusCode>,
        message: Option<&str>,
    ) {
        self.table.write().await.get = Some(Fault {
            predicate: Arc::new(predicate),
            status: status.into(),
            message: message_or_default(message, "get"),
        });
    }

    /// Fails every add whose entity matches `predicate`, replacing any previous add fault.
    pub async fn fail_add(
        &self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
        status: impl Into<StatusCode>,
        message: Option<&str>,
    ) {
        self.table.write().await.add = Some(Fault {
            predicate: Arc::new(predicate),
            status: status.into(),
            message: message_or_default(message, "add"),
        });
    }

    /// Fails counts while `predicate` returns `true`, replacing any previous count fault.
    pub async fn fail_count(
        &self,
        predicate: impl Fn() -> bool + Send + Sync + 'static,
        status: impl Into<StatusCode>,
        message: Option<&str>,
    ) {
        self.table.write().await.count = Some(Fault {
            predicate: Arc::new(predicate),
            status: status.into(),
            message: message_or_default(message, "count"),
        });
    }

    pub async fn clear_get(&self) {
        self.table.write().await.get = None;
    }

    pub async fn clear_add(&self) {
        self.table.write().await.add = None;
    }

    pub async fn clear_count(&self) {
        self.table.write().await.count = None;
    }

    pub async fn clear_all(&self) {
        *self.table.write().await = FaultTable::default();
    }

    pub(crate) async fn check_get(&self, id: &str) -> RepositoryResult<()> {
        let table = self.table.read().await;

        match &table.get {
            Some(fault) if (fault.predicate)(id) => {
                warn!(id = %id, status = %fault.status, "injecting get failure");
                Err(fault.error())
            }
            _ => Ok(()),
        }
    }

    pub(crate) async fn check_add(&self, entity: &T) -> RepositoryResult<()> {
        let table = self.table.read().await;

        match &table.add {
            Some(fault) if (fault.predicate)(entity) => {
                warn!(status = %fault.status, "injecting add failure");
                Err(fault.error())
            }
            _ => Ok(()),
        }
    }

    pub(crate) async fn check_count(&self) -> RepositoryResult<()> {
        let table = self.table.read().await;

        match &table.count {
            Some(fault) if (fault.predicate)() => {
                warn!(status = %fault.status, "injecting count failure");
                Err(fault.error())
            }
            _ => Ok(()),
        }
    }
}
