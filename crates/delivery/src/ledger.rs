use chrono::Utc;
use shared::domain::FacilityId;
use tracing::{debug, warn};

use crate::{finish, DeliveryError, DeliveryStore, DeliveryTx};

/// Owns every change to a facility's `current_level_kg`.
///
/// Deltas are applied with the store's atomic add-and-return, so two transactions crediting
/// the same facility compose instead of overwriting each other. A delta that would leave the
/// level negative is reported as [`DeliveryError::InvalidState`]; the caller's transaction
/// must then be rolled back, which discards the write.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    /// Applies `delta_kg` inside the caller's transaction and returns the new level.
    pub async fn apply_delta<T: DeliveryTx>(
        &self,
        tx: &mut T,
        facility_id: FacilityId,
        delta_kg: f64,
    ) -> Result<f64, DeliveryError> {
        if !delta_kg.is_finite() {
            return Err(DeliveryError::BadRequest(format!(
                "delta for facility {facility_id} must be a finite number of kg"
            )));
        }

        let level_kg = tx
            .add_facility_level(facility_id, delta_kg, Utc::now())
            .await
            .map_err(DeliveryError::Store)?
            .ok_or_else(|| DeliveryError::facility_not_found(facility_id))?;

        if level_kg < 0.0 {
            warn!(
                %facility_id,
                delta_kg,
                level_kg,
                "rejecting delta that would drive facility level negative"
            );
            return Err(DeliveryError::InvalidState {
                facility_id,
                level_kg,
            });
        }

        debug!(%facility_id, delta_kg, level_kg, "facility level updated");
        Ok(level_kg)
    }

    /// Applies `delta_kg` in a transaction of its own.
    pub async fn apply_delta_standalone<S: DeliveryStore>(
        &self,
        store: &S,
        facility_id: FacilityId,
        delta_kg: f64,
    ) -> Result<f64, DeliveryError> {
        let mut tx = store.begin().await.map_err(DeliveryError::Store)?;
        let result = self.apply_delta(&mut tx, facility_id, delta_kg).await;
        finish(tx, result).await
    }
}
