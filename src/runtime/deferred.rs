//! Deferred values: the result of calling an `async def` function.
//!
//! The producer starts immediately and runs synchronously up to its first
//! suspension point; the rest continues as a local tokio task. Awaiting a
//! deferred parks on a `Notify` until the outcome is stored.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use tokio::sync::Notify;

use crate::error::RuntimeError;
use crate::runtime::value::Value;

type Outcome = Result<Value, RuntimeError>;

#[derive(Default)]
struct DeferredState {
    outcome: RefCell<Option<Outcome>>,
    observed: Cell<bool>,
    settled: Notify,
}

impl Drop for DeferredState {
    fn drop(&mut self) {
        if let Some(Err(error)) = self.outcome.get_mut()
            && !self.observed.get()
        {
            tracing::warn!("async function failed and was never awaited: {error}");
        }
    }
}

#[derive(Clone, Default)]
pub struct Deferred(Rc<DeferredState>);

impl Deferred {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn resolved(value: Value) -> Self {
        let deferred = Self::pending();
        deferred.settle(Ok(value));
        deferred
    }

    /// Starts `producer` now. Must be called from inside a `LocalSet` when
    /// the producer can suspend.
    pub fn spawn(producer: impl Future<Output = Outcome> + 'static) -> Self {
        let deferred = Self::pending();
        let mut producer = Box::pin(producer);

        // A noop waker is enough here: every tokio resource re-registers the
        // real waker when the spawned task polls it again.
        let mut context = Context::from_waker(Waker::noop());
        match producer.as_mut().poll(&mut context) {
            Poll::Ready(outcome) => deferred.settle(outcome),
            Poll::Pending => {
                let handle = deferred.clone();
                tokio::task::spawn_local(async move {
                    let outcome = producer.await;
                    handle.settle(outcome);
                });
            }
        }
        deferred
    }

    pub fn settle(&self, outcome: Outcome) {
        *self.0.outcome.borrow_mut() = Some(outcome);
        self.0.settled.notify_waiters();
    }

    pub fn is_settled(&self) -> bool {
        self.0.outcome.borrow().is_some()
    }

    pub async fn wait(&self) -> Outcome {
        self.0.observed.set(true);
        loop {
            // Register interest before checking so a settle in between is not lost.
            let mut notified = pin!(self.0.settled.notified());
            notified.as_mut().enable();
            if let Some(outcome) = self.0.outcome.borrow().as_ref() {
                return outcome.clone();
            }
            notified.await;
        }
    }

    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn block_on_local<F: Future>(future: F) -> F::Output {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        tokio::task::LocalSet::new().block_on(&runtime, future)
    }

    #[test]
    fn producer_without_suspension_settles_immediately() {
        block_on_local(async {
            let deferred = Deferred::spawn(async { Ok(Value::Number(1.0)) });
            assert!(deferred.is_settled());
            assert!(matches!(deferred.wait().await, Ok(Value::Number(n)) if n == 1.0));
        });
    }

    #[test]
    fn waits_for_suspended_producer() {
        block_on_local(async {
            let deferred = Deferred::spawn(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Value::from("done"))
            });
            assert!(!deferred.is_settled());
            let value = deferred.wait().await.expect("producer succeeds");
            assert_eq!(value.to_string(), "done");
        });
    }

    #[test]
    fn errors_reach_every_waiter() {
        block_on_local(async {
            let deferred = Deferred::spawn(async {
                tokio::task::yield_now().await;
                Err(RuntimeError::internal("boom"))
            });
            let first = deferred.wait().await;
            let second = deferred.wait().await;
            assert!(first.is_err());
            assert_eq!(first.err(), second.err());
        });
    }
}
