use delivery::{DeliveryError, DeliveryOrchestrator};
use shared::{
    domain::{DeliveryAction, FacilityId, RouteId, StorageFacility, TransportRoute},
    error::{ApiError, ErrorCode},
    protocol::{DeliveryRequest, DeliveryResponse},
};
use storage::Storage;
use tracing::error;

#[derive(Clone, Debug)]
pub struct ApiContext {
    pub storage: Storage,
    pub orchestrator: DeliveryOrchestrator<Storage>,
}

impl ApiContext {
    pub fn new(storage: Storage) -> Self {
        Self {
            orchestrator: DeliveryOrchestrator::new(storage.clone()),
            storage,
        }
    }
}

/// Validates `{action, routeId}` and runs it through the orchestrator.
pub async fn execute_delivery(
    ctx: &ApiContext,
    request: &DeliveryRequest,
) -> Result<DeliveryResponse, ApiError> {
    let (action, route_id) = parse_request(request)?;
    let outcome = ctx
        .orchestrator
        .execute(action, route_id)
        .await
        .map_err(|err| delivery_error(action, route_id, err))?;
    Ok(DeliveryResponse::ok(
        outcome.message(),
        outcome.facility_level_kg(),
    ))
}

pub async fn get_route(ctx: &ApiContext, route_id: RouteId) -> Result<TransportRoute, ApiError> {
    ctx.storage
        .load_route(route_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("route {route_id} not found")))
}

pub async fn get_facility(
    ctx: &ApiContext,
    facility_id: FacilityId,
) -> Result<StorageFacility, ApiError> {
    ctx.storage
        .load_facility(facility_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::NotFound,
                format!("facility {facility_id} not found"),
            )
        })
}

fn parse_request(request: &DeliveryRequest) -> Result<(DeliveryAction, RouteId), ApiError> {
    let action = request
        .action
        .as_deref()
        .filter(|action| !action.trim().is_empty())
        .ok_or_else(|| ApiError::new(ErrorCode::BadRequest, "action is required"))?
        .parse::<DeliveryAction>()
        .map_err(|err| ApiError::new(ErrorCode::BadRequest, err.to_string()))?;
    let route_id = request
        .route_id
        .map(RouteId)
        .ok_or_else(|| ApiError::new(ErrorCode::BadRequest, "routeId is required"))?;
    Ok((action, route_id))
}

fn delivery_error(action: DeliveryAction, route_id: RouteId, err: DeliveryError) -> ApiError {
    if let DeliveryError::Store(source) = &err {
        let detail = format!("{source:#}");
        error!(%route_id, %action, error = %detail, "delivery store failure");
    }
    err.into()
}

fn internal(err: anyhow::Error) -> ApiError {
    let detail = format!("{err:#}");
    error!(error = %detail, "storage read failed");
    ApiError::new(ErrorCode::Internal, "internal storage failure")
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
