//! Coalescing of concurrent identical remote calls
//!
//! Callers that ask for the same key while a call is outstanding share its
//! outcome instead of issuing their own request. The call runs on a spawned
//! task, so a caller that is dropped mid-await (client disconnect, request
//! timeout) never cancels it for the others.
//!
//! The outcome is not retained: once the task finishes its entry is removed
//! and the next caller starts a fresh call.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::error::SystemError;

type Flight<V> = Shared<BoxFuture<'static, Result<V, SystemError>>>;
type FlightTable<K, V> = Arc<Mutex<HashMap<K, (u64, Flight<V>)>>>;

pub(crate) struct SingleFlight<K, V> {
    flights: FlightTable<K, V>,
    next_id: AtomicU64,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the outstanding call for `key`, or start one with `work`
    pub(crate) async fn run<F, Fut>(&self, key: K, work: F) -> Result<V, SystemError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, SystemError>> + Send + 'static,
    {
        let flight = {
            let mut flights = self.flights.lock();
            match flights.get(&key) {
                Some((_, flight)) => flight.clone(),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let flight = self.launch(key.clone(), id, work());
                    // Inserted before the lock is released, so the task's
                    // removal can never run ahead of this insert
                    flights.insert(key, (id, flight.clone()));
                    flight
                }
            }
        };

        flight.await
    }

    /// Number of calls currently outstanding
    pub(crate) fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    fn launch<Fut>(&self, key: K, id: u64, work: Fut) -> Flight<V>
    where
        Fut: Future<Output = Result<V, SystemError>> + Send + 'static,
    {
        let table = Arc::clone(&self.flights);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = work.await;
            remove_if_current(&table, &task_key, id);
            outcome
        });

        let table = Arc::clone(&self.flights);
        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(_) => {
                    remove_if_current(&table, &key, id);
                    Err(SystemError::Internal("background fetch task failed"))
                }
            }
        }
        .boxed()
        .shared()
    }
}

fn remove_if_current<K, V>(table: &FlightTable<K, V>, key: &K, id: u64)
where
    K: Eq + Hash,
{
    let mut flights = table.lock();
    if flights.get(key).is_some_and(|(current, _)| *current == id) {
        flights.remove(key);
    }
}
