//! Per-installation flights that collapse concurrent token exchanges.
//!
//! The first task to miss the cache for an installation starts a flight and
//! runs the exchange. Tasks arriving while it runs join the same flight and
//! receive its outcome, failures included, instead of exchanging again. The
//! flight is forgotten once it lands, so the next miss starts a new one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::auth::{InstallationId, InstallationToken};
use crate::error::AuthError;

pub(crate) type Outcome = Result<InstallationToken, AuthError>;

type Flight = Arc<OnceCell<Outcome>>;

/// Map of installation id to its exchange in flight.
#[derive(Default)]
pub(crate) struct SingleFlight {
    flights: Mutex<HashMap<InstallationId, Flight>>,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `exchange` for `installation_id`, or join the flight already running.
    ///
    /// Returns `None` if `deadline` passes before the outcome is known. If the
    /// task running the exchange is cancelled, one of the joined tasks takes
    /// over with its own `exchange`.
    pub(crate) async fn run<F, Fut>(
        &self,
        installation_id: InstallationId,
        deadline: Option<Instant>,
        exchange: F,
    ) -> Option<Outcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let flight = self.join(installation_id);

        let outcome = match deadline {
            Some(d) => tokio::time::timeout_at(d, flight.get_or_init(exchange))
                .await
                .ok()?
                .clone(),
            None => flight.get_or_init(exchange).await.clone(),
        };

        self.land(installation_id, &flight);
        Some(outcome)
    }

    fn join(&self, installation_id: InstallationId) -> Flight {
        // The map is only touched for a lookup, insert or remove, so a poisoned
        // guard still holds a consistent map.
        let mut flights = self.flights.lock().unwrap_or_else(|p| p.into_inner());
        flights
            .entry(installation_id)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Forget `flight` if it is still the current one for `installation_id`.
    fn land(&self, installation_id: InstallationId, flight: &Flight) {
        let mut flights = self.flights.lock().unwrap_or_else(|p| p.into_inner());
        if flights
            .get(&installation_id)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            flights.remove(&installation_id);
        }
    }

    /// Number of installations with a flight in progress.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.flights.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(test)]
#[path = "single_flight_tests.rs"]
mod tests;
