use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{DeliveryAction, FacilityId, RouteId, RouteStatus, TransportRoute},
    error::{ApiError, ErrorCode},
};
use thiserror::Error;
use tracing::warn;

mod ledger;
mod orchestrator;

pub use ledger::InventoryLedger;
pub use orchestrator::{CompletedTransfer, DeliveryOrchestrator, DeliveryOutcome};

/// Opens units of work against the backing store.
///
/// Everything the delivery core reads or writes goes through a [`DeliveryTx`]; nothing is
/// persisted until [`DeliveryTx::commit`] succeeds.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    type Tx: DeliveryTx;

    async fn begin(&self) -> Result<Self::Tx>;
}

#[async_trait]
pub trait DeliveryTx: Send {
    /// Reads the route and holds it against concurrent writers until the transaction ends.
    async fn lock_route(&mut self, route_id: RouteId) -> Result<Option<TransportRoute>>;

    async fn set_route_status(
        &mut self,
        route_id: RouteId,
        status: RouteStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Marks the route delivered and clears load and pending-delivery fields.
    async fn finalize_route(&mut self, route_id: RouteId, at: DateTime<Utc>) -> Result<()>;

    /// Atomically adds `delta_kg` to the facility level and returns the new level, or `None`
    /// when the facility does not exist.
    async fn add_facility_level(
        &mut self,
        facility_id: FacilityId,
        delta_kg: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<f64>>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("cannot {action} route {route_id} while it is {status}")]
    StateConflict {
        route_id: RouteId,
        action: DeliveryAction,
        status: RouteStatus,
    },
    #[error("facility {facility_id} level would become {level_kg} kg")]
    InvalidState { facility_id: FacilityId, level_kg: f64 },
    #[error("store failure: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl DeliveryError {
    pub fn route_not_found(route_id: RouteId) -> Self {
        Self::NotFound {
            entity: "route",
            id: route_id.0,
        }
    }

    pub fn facility_not_found(facility_id: FacilityId) -> Self {
        Self::NotFound {
            entity: "facility",
            id: facility_id.0,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            DeliveryError::BadRequest(_) => ErrorCode::BadRequest,
            DeliveryError::NotFound { .. } => ErrorCode::NotFound,
            DeliveryError::StateConflict { .. } => ErrorCode::StateConflict,
            DeliveryError::InvalidState { .. } => ErrorCode::InvalidState,
            DeliveryError::Store(_) => ErrorCode::Internal,
        }
    }

    /// Only store failures are worth retrying; every other variant is a final answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Store(_))
    }
}

impl From<DeliveryError> for ApiError {
    fn from(value: DeliveryError) -> Self {
        let message = match &value {
            DeliveryError::Store(_) => "internal storage failure; retry the request".to_string(),
            other => other.to_string(),
        };
        ApiError::new(value.code(), message)
    }
}

/// Commits on success and rolls back on failure. A commit failure turns a success into a
/// store error, since nothing was persisted.
pub(crate) async fn finish<T: DeliveryTx, O>(
    tx: T,
    result: Result<O, DeliveryError>,
) -> Result<O, DeliveryError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(DeliveryError::Store)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "delivery transaction rollback failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
