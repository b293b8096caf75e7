//! Pending results of asynchronous foreign calls.
//!
//! A loader that runs a guest callable on its own event loop hands the host a
//! [`Future`] and keeps the matching [`Resolver`]. The two sides share no run
//! loop: settlement is published through a mutex/condvar pair for blocking
//! waiters and a [`tokio::sync::Notify`] for async ones, and an atomic flag
//! makes the settled state cheap to poll from any thread.
//!
//! A future settles at most once. [`Resolver::resolve`] and
//! [`Resolver::reject`] consume the resolver, and a resolver dropped without
//! settling rejects the future so that no waiter hangs forever.

use crate::value::{Exception, Value};
use crate::LOG_TARGET;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::warn;

/// Label of the exception used when a resolver is dropped unsettled.
pub const ABANDONED_LABEL: &str = "AbandonedFuture";

/// Outcome of a settled future.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Resolved(Value),
    Rejected(Value),
}

impl Settlement {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Settlement::Resolved(_))
    }

    /// `Ok` for a resolved value, `Err` for a rejection reason.
    pub fn into_result(self) -> Result<Value, Value> {
        match self {
            Settlement::Resolved(v) => Ok(v),
            Settlement::Rejected(v) => Err(v),
        }
    }
}

struct Shared {
    settled: AtomicBool,
    slot: Mutex<Option<Settlement>>,
    ready: Condvar,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<Settlement>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, settlement: Settlement) {
        let mut slot = self.lock();
        if slot.is_some() {
            warn!(target: LOG_TARGET, "Ignoring duplicate future settlement");
            return;
        }
        *slot = Some(settlement);
        self.settled.store(true, Ordering::Release);
        drop(slot);

        self.ready.notify_all();
        self.notify.notify_waiters();
    }
}

/// Host side of an asynchronous result.
///
/// Clones share the same settlement.
#[derive(Clone)]
pub struct Future {
    shared: Arc<Shared>,
}

/// Loader side of an asynchronous result.
pub struct Resolver {
    shared: Option<Arc<Shared>>,
}

impl Future {
    /// Create an unsettled future and its resolver.
    pub fn pending() -> (Future, Resolver) {
        let shared = Arc::new(Shared {
            settled: AtomicBool::new(false),
            slot: Mutex::new(None),
            ready: Condvar::new(),
            notify: Notify::new(),
        });

        (
            Future {
                shared: Arc::clone(&shared),
            },
            Resolver {
                shared: Some(shared),
            },
        )
    }

    /// A future that is already resolved.
    pub fn resolved(value: Value) -> Future {
        let (future, resolver) = Future::pending();
        resolver.resolve(value);
        future
    }

    /// A future that is already rejected.
    pub fn rejected(reason: Value) -> Future {
        let (future, resolver) = Future::pending();
        resolver.reject(reason);
        future
    }

    pub fn is_settled(&self) -> bool {
        self.shared.settled.load(Ordering::Acquire)
    }

    /// The settlement, if there is one yet.
    pub fn try_result(&self) -> Option<Settlement> {
        if !self.is_settled() {
            return None;
        }
        self.shared.lock().clone()
    }

    /// Block the current thread until the future settles.
    ///
    /// Must not be called from inside an async task; use
    /// [`settled`](Self::settled) there.
    pub fn wait(&self) -> Settlement {
        let mut slot = self.shared.lock();
        loop {
            if let Some(settlement) = slot.as_ref() {
                return settlement.clone();
            }
            slot = self
                .shared
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the future settles or `timeout` elapses.
    ///
    /// A timeout too large to express as a deadline waits without limit.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Settlement> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut slot = self.shared.lock();
        loop {
            if let Some(settlement) = slot.as_ref() {
                return Some(settlement.clone());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (next, _) = self
                .shared
                .ready
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            slot = next;
        }
    }

    /// Wait asynchronously until the future settles.
    pub async fn settled(&self) -> Settlement {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(settlement) = self.try_result() {
                return settlement;
            }

            notified.await;
        }
    }

    /// Whether both handles refer to the same pending result.
    pub fn ptr_eq(&self, other: &Future) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl Resolver {
    /// Settle the future with a value.
    pub fn resolve(mut self, value: Value) {
        if let Some(shared) = self.shared.take() {
            shared.settle(Settlement::Resolved(value));
        }
    }

    /// Settle the future with a rejection reason.
    pub fn reject(mut self, reason: Value) {
        if let Some(shared) = self.shared.take() {
            shared.settle(Settlement::Rejected(reason));
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            warn!(target: LOG_TARGET, "Future resolver dropped without settling");
            shared.settle(Settlement::Rejected(Value::Exception(Exception::new(
                "Future was abandoned before it settled",
                ABANDONED_LABEL,
            ))));
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_resolve_from_another_thread() {
        let (future, resolver) = Future::pending();
        assert!(!future.is_settled());
        assert!(future.try_result().is_none());

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(Value::long(32));
        });

        assert_eq!(future.wait(), Settlement::Resolved(Value::long(32)));
        assert!(future.is_settled());
        worker.join().unwrap();
    }

    #[test]
    fn test_reject() {
        let future = Future::rejected(Value::string("nope"));
        assert_eq!(
            future.try_result().unwrap().into_result(),
            Err(Value::string("nope"))
        );
    }

    #[test]
    fn test_clones_share_settlement() {
        let (future, resolver) = Future::pending();
        let other = future.clone();
        assert!(future.ptr_eq(&other));

        resolver.resolve(Value::bool(true));
        assert_eq!(other.try_result(), Some(Settlement::Resolved(Value::bool(true))));
        assert_eq!(future.wait(), Settlement::Resolved(Value::bool(true)));
    }

    #[test]
    fn test_dropped_resolver_rejects() {
        let (future, resolver) = Future::pending();
        drop(resolver);

        match future.wait() {
            Settlement::Rejected(Value::Exception(e)) => assert_eq!(e.label, ABANDONED_LABEL),
            other => panic!("unexpected settlement: {:?}", other),
        }
    }

    #[test]
    fn test_wait_timeout_expires() {
        let (future, _resolver) = Future::pending();
        assert!(future.wait_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_wait_timeout_with_unbounded_duration() {
        let (future, resolver) = Future::pending();

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(Value::long(1));
        });

        assert_eq!(
            future.wait_timeout(Duration::MAX),
            Some(Settlement::Resolved(Value::long(1)))
        );
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn test_settled_async() {
        let (future, resolver) = Future::pending();

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(Value::string("done"));
        });

        let settlement = future.settled().await;
        assert_eq!(settlement, Settlement::Resolved(Value::string("done")));
        worker.join().unwrap();
    }
}
