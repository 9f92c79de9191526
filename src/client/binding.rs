//! Observable wrapper around repeated calls to one task.
//!
//! [`TaskBinding`] is what UI state hangs off: a `mutate` call plus an
//! in-flight flag and the last outcome. All protocol work is delegated to
//! [`TaskClient::execute`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use super::TaskClient;
use crate::error::TaskClientError;

struct BindingState<O> {
    in_flight: watch::Sender<usize>,
    last_result: Mutex<Option<Result<O, TaskClientError>>>,
}

/// A task route bound to a client.
///
/// Clones share state, so a clone handed to another component observes the
/// same in-flight count and last result.
pub struct TaskBinding<I, O> {
    client: TaskClient,
    route: Arc<str>,
    state: Arc<BindingState<O>>,
    _input: PhantomData<fn(&I)>,
}

impl<I, O> Clone for TaskBinding<I, O> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            route: Arc::clone(&self.route),
            state: Arc::clone(&self.state),
            _input: PhantomData,
        }
    }
}

impl<I, O> fmt::Debug for TaskBinding<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBinding")
            .field("route", &self.route)
            .field("in_flight", &*self.state.in_flight.borrow())
            .finish()
    }
}

/// Decrements the in-flight count when a call ends, including when its
/// future is dropped.
struct InFlight<'a>(&'a watch::Sender<usize>);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl<I, O> TaskBinding<I, O>
where
    I: Serialize,
    O: DeserializeOwned + Clone,
{
    /// Bind `route` to `client`.
    pub fn new(client: TaskClient, route: impl Into<String>) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            client,
            route: Arc::from(route.into()),
            state: Arc::new(BindingState {
                in_flight,
                last_result: Mutex::new(None),
            }),
            _input: PhantomData,
        }
    }

    /// The bound route.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Invoke the task and record the outcome.
    ///
    /// Concurrent calls are not coordinated; callers that want at most one in
    /// flight can check [`is_mutating`](Self::is_mutating) first.
    pub async fn mutate(&self, input: &I) -> Result<O, TaskClientError> {
        let _guard = InFlight::enter(&self.state.in_flight);
        let outcome = self.client.execute(&self.route, input).await;
        *self.state.last_result.lock() = Some(outcome.clone());
        outcome
    }

    /// Returns `true` while any [`mutate`](Self::mutate) call is in flight.
    pub fn is_mutating(&self) -> bool {
        *self.state.in_flight.borrow() > 0
    }

    /// Watch the number of in-flight calls. Zero means idle.
    pub fn subscribe_mutating(&self) -> watch::Receiver<usize> {
        self.state.in_flight.subscribe()
    }

    /// The outcome of the most recently completed call.
    pub fn last_result(&self) -> Option<Result<O, TaskClientError>> {
        self.state.last_result.lock().clone()
    }
}
