//! The booking lifecycle manager.
//!
//! Sole writer of booking records: create, cancel, and approve all flow
//! through here. Each mutation is validated, authorization-gated, and
//! committed as one atomic unit against the reservation store.

mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::catalog::RoomCatalog;
use crate::config::EngineConfig;
use crate::store::{ReservationStore, StoreError};

pub struct Engine {
    store: Arc<dyn ReservationStore>,
    catalog: Arc<dyn RoomCatalog>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        catalog: Arc<dyn RoomCatalog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Run one store call under the caller's cancel token and the per-attempt
    /// budget. Both paths drop the in-flight call and surface `Timeout` —
    /// distinct from `Conflict`, so clients can tell "try a new slot" apart
    /// from "try again later". A commit the store has already started still
    /// finishes atomically on its own task; only this caller stops waiting.
    pub(super) async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Timeout("cancelled by caller".into())),
            res = tokio::time::timeout(self.config.store_timeout, op) => match res {
                Err(_) => Err(EngineError::Timeout("store call exceeded budget".into())),
                Ok(r) => r.map_err(EngineError::from),
            },
        }
    }
}
