//! Coalescing of concurrent identical generations.
//!
//! The first caller for a fingerprint becomes the leader and holds a [`FlightGuard`].
//! Later callers for the same fingerprint get a [`FlightWaiter`] and receive the
//! leader's text when it finishes. If the leader fails, or its task is dropped
//! mid-flight, waiters are told there is nothing to share.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::cache::CacheKey;

#[derive(Debug, Clone)]
enum FlightState {
    Pending,
    /// `None` when the leader produced no shareable text.
    Done(Option<String>),
}

type FlightMap = Arc<Mutex<HashMap<CacheKey, watch::Receiver<FlightState>>>>;

#[derive(Debug, Default)]
pub struct SingleFlight {
    flights: FlightMap,
}

pub enum Flight {
    Leader(FlightGuard),
    Follower(FlightWaiter),
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight generation for `key`, or start one.
    pub fn begin(&self, key: &CacheKey) -> Flight {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rx) = flights.get(key) {
            return Flight::Follower(FlightWaiter { rx: rx.clone() });
        }
        let (tx, rx) = watch::channel(FlightState::Pending);
        flights.insert(key.clone(), rx);
        Flight::Leader(FlightGuard {
            key: key.clone(),
            tx,
            flights: self.flights.clone(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held by the leader. Dropping it without [`FlightGuard::complete`] releases
/// waiters with no result.
pub struct FlightGuard {
    key: CacheKey,
    tx: watch::Sender<FlightState>,
    flights: FlightMap,
}

impl FlightGuard {
    pub fn complete(self, text: Option<String>) {
        // Ignored error: no waiter is listening.
        let _ = self.tx.send(FlightState::Done(text));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        flights.remove(&self.key);
    }
}

pub struct FlightWaiter {
    rx: watch::Receiver<FlightState>,
}

impl FlightWaiter {
    /// Wait for the leader. `None` means run independently.
    pub async fn wait(mut self) -> Option<String> {
        loop {
            let state = self.rx.borrow().clone();
            if let FlightState::Done(text) = state {
                return text;
            }
            if self.rx.changed().await.is_err() {
                return None;
            }
        }
    }
}
