use chrono::Utc;
use shared::domain::{DeliveryAction, FacilityId, RouteId, TransportRoute};
use tracing::{info, warn};

use crate::{finish, DeliveryError, DeliveryStore, DeliveryTx, InventoryLedger};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedTransfer {
    pub facility_id: FacilityId,
    pub delivered_kg: f64,
    pub facility_level_kg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeliveryOutcome {
    Started {
        route_id: RouteId,
    },
    Delivered {
        route_id: RouteId,
        transfer: Option<CompletedTransfer>,
    },
}

impl DeliveryOutcome {
    pub fn route_id(&self) -> RouteId {
        match self {
            DeliveryOutcome::Started { route_id } | DeliveryOutcome::Delivered { route_id, .. } => {
                *route_id
            }
        }
    }

    pub fn facility_level_kg(&self) -> Option<f64> {
        match self {
            DeliveryOutcome::Delivered {
                transfer: Some(transfer),
                ..
            } => Some(transfer.facility_level_kg),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            DeliveryOutcome::Started { route_id } => format!("route {route_id} is now in transit"),
            DeliveryOutcome::Delivered {
                route_id,
                transfer: None,
            } => format!("route {route_id} delivered"),
            DeliveryOutcome::Delivered {
                route_id,
                transfer: Some(transfer),
            } => format!(
                "route {route_id} delivered {} kg to facility {}; level now {} kg",
                transfer.delivered_kg, transfer.facility_id, transfer.facility_level_kg
            ),
        }
    }
}

/// Drives routes through `scheduled -> in_transit -> delivered`.
///
/// Each call runs in one store transaction. The route is locked and its status re-checked
/// inside that transaction, so of two racing `complete` calls exactly one credits the
/// facility and the other sees `delivered`.
#[derive(Debug, Clone)]
pub struct DeliveryOrchestrator<S: DeliveryStore> {
    store: S,
    ledger: InventoryLedger,
}

impl<S: DeliveryStore> DeliveryOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ledger: InventoryLedger,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> InventoryLedger {
        self.ledger
    }

    pub async fn execute(
        &self,
        action: DeliveryAction,
        route_id: RouteId,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let mut tx = self.store.begin().await.map_err(DeliveryError::Store)?;
        let result = match action {
            DeliveryAction::Start => self.start_in(&mut tx, route_id).await,
            DeliveryAction::Complete => self.complete_in(&mut tx, route_id).await,
        };
        let outcome = finish(tx, result).await;

        match &outcome {
            Ok(DeliveryOutcome::Started { .. }) => info!(%route_id, "route started"),
            Ok(DeliveryOutcome::Delivered {
                transfer: Some(transfer),
                ..
            }) => info!(
                %route_id,
                facility_id = %transfer.facility_id,
                delivered_kg = transfer.delivered_kg,
                level_kg = transfer.facility_level_kg,
                "route delivered into facility"
            ),
            Ok(DeliveryOutcome::Delivered { transfer: None, .. }) => {
                info!(%route_id, "route delivered without inventory transfer")
            }
            Err(err) if err.is_retryable() => {
                warn!(%route_id, %action, error = %err, "delivery rolled back on store failure")
            }
            Err(err) => info!(%route_id, %action, error = %err, "delivery rejected"),
        }

        outcome
    }

    pub async fn start(&self, route_id: RouteId) -> Result<DeliveryOutcome, DeliveryError> {
        self.execute(DeliveryAction::Start, route_id).await
    }

    pub async fn complete(&self, route_id: RouteId) -> Result<DeliveryOutcome, DeliveryError> {
        self.execute(DeliveryAction::Complete, route_id).await
    }

    async fn start_in(
        &self,
        tx: &mut S::Tx,
        route_id: RouteId,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        lock_for(tx, route_id, DeliveryAction::Start).await?;
        tx.set_route_status(route_id, DeliveryAction::Start.next_status(), Utc::now())
            .await
            .map_err(DeliveryError::Store)?;
        Ok(DeliveryOutcome::Started { route_id })
    }

    async fn complete_in(
        &self,
        tx: &mut S::Tx,
        route_id: RouteId,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let route = lock_for(tx, route_id, DeliveryAction::Complete).await?;

        let transfer = match route.pending_transfer() {
            Some((facility_id, delivered_kg)) => {
                let facility_level_kg = self
                    .ledger
                    .apply_delta(tx, facility_id, delivered_kg)
                    .await?;
                Some(CompletedTransfer {
                    facility_id,
                    delivered_kg,
                    facility_level_kg,
                })
            }
            None => None,
        };

        tx.finalize_route(route_id, Utc::now())
            .await
            .map_err(DeliveryError::Store)?;
        Ok(DeliveryOutcome::Delivered { route_id, transfer })
    }
}

async fn lock_for<T: DeliveryTx>(
    tx: &mut T,
    route_id: RouteId,
    action: DeliveryAction,
) -> Result<TransportRoute, DeliveryError> {
    let route = tx
        .lock_route(route_id)
        .await
        .map_err(DeliveryError::Store)?
        .ok_or_else(|| DeliveryError::route_not_found(route_id))?;

    if route.status != action.required_status() {
        return Err(DeliveryError::StateConflict {
            route_id,
            action,
            status: route.status,
        });
    }
    Ok(route)
}
