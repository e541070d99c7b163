use super::*;
use shared::domain::RouteStatus;
use storage::NewRoute;

async fn setup() -> (ApiContext, FacilityId, RouteId) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let facility = storage
        .create_facility("depot", 100.0)
        .await
        .expect("facility");
    let route = storage
        .create_route(
            &NewRoute::scheduled(25.0, Some(facility)).with_status(RouteStatus::InTransit),
        )
        .await
        .expect("route");
    (ApiContext::new(storage), facility, route)
}

fn request(action: Option<&str>, route_id: Option<RouteId>) -> DeliveryRequest {
    DeliveryRequest {
        action: action.map(str::to_string),
        route_id: route_id.map(|id| id.0),
    }
}

#[tokio::test]
async fn complete_reports_new_facility_level() {
    let (ctx, facility, route) = setup().await;
    let response = execute_delivery(&ctx, &request(Some("complete"), Some(route)))
        .await
        .expect("complete");
    assert!(response.success);
    assert_eq!(response.facility_level_kg, Some(125.0));

    let tank = get_facility(&ctx, facility).await.expect("facility");
    assert_eq!(tank.current_level_kg, 125.0);
    let stored = get_route(&ctx, route).await.expect("route");
    assert_eq!(stored.status, RouteStatus::Delivered);
}

#[tokio::test]
async fn unknown_action_is_a_bad_request_without_side_effects() {
    let (ctx, facility, route) = setup().await;
    let err = execute_delivery(&ctx, &request(Some("pause"), Some(route)))
        .await
        .expect_err("pause");
    assert!(matches!(err.code, ErrorCode::BadRequest));
    assert!(err.message.contains("pause"));

    assert_eq!(
        get_route(&ctx, route).await.expect("route").status,
        RouteStatus::InTransit
    );
    assert_eq!(
        get_facility(&ctx, facility)
            .await
            .expect("facility")
            .current_level_kg,
        100.0
    );
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    let (ctx, _facility, route) = setup().await;
    for req in [
        request(None, Some(route)),
        request(Some("  "), Some(route)),
        request(Some("start"), None),
    ] {
        let err = execute_delivery(&ctx, &req).await.expect_err("bad request");
        assert!(matches!(err.code, ErrorCode::BadRequest));
    }
}

#[tokio::test]
async fn start_of_in_transit_route_conflicts() {
    let (ctx, _facility, route) = setup().await;
    let err = execute_delivery(&ctx, &request(Some("start"), Some(route)))
        .await
        .expect_err("conflict");
    assert!(matches!(err.code, ErrorCode::StateConflict));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (ctx, _facility, route) = setup().await;
    let err = execute_delivery(&ctx, &request(Some("start"), Some(RouteId(route.0 + 50))))
        .await
        .expect_err("missing");
    assert!(matches!(err.code, ErrorCode::NotFound));

    let err = get_facility(&ctx, FacilityId(999))
        .await
        .expect_err("missing facility");
    assert!(matches!(err.code, ErrorCode::NotFound));
}
