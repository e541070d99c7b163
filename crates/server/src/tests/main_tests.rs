use super::*;
use axum::{body, body::Body, http::Request};
use shared::domain::RouteStatus;
use storage::NewRoute;
use tower::ServiceExt;

async fn test_app() -> (Router, Storage, FacilityId, RouteId) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let facility = storage
        .create_facility("depot", 100.0)
        .await
        .expect("facility");
    let route = storage
        .create_route(&NewRoute::scheduled(25.0, Some(facility)))
        .await
        .expect("route");

    let app = build_router(
        Arc::new(AppState {
            api: ApiContext::new(storage.clone()),
        }),
        4 * 1024,
    );
    (app, storage, facility, route)
}

fn delivery_request(body: serde_json::Value) -> Request<Body> {
    Request::post("/deliveries")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _storage, _facility, _route) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn start_then_complete_moves_inventory() {
    let (app, storage, facility, route) = test_app().await;

    let started = app
        .clone()
        .oneshot(delivery_request(
            serde_json::json!({ "action": "start", "routeId": route.0 }),
        ))
        .await
        .expect("response");
    assert_eq!(started.status(), StatusCode::OK);
    let started: DeliveryResponse = read_json(started).await;
    assert!(started.success);
    assert!(started.facility_level_kg.is_none());

    let completed = app
        .clone()
        .oneshot(delivery_request(
            serde_json::json!({ "action": "complete", "routeId": route.0 }),
        ))
        .await
        .expect("response");
    assert_eq!(completed.status(), StatusCode::OK);
    let completed: DeliveryResponse = read_json(completed).await;
    assert!(completed.success);
    assert_eq!(completed.facility_level_kg, Some(125.0));

    let tank = storage
        .load_facility(facility)
        .await
        .expect("load")
        .expect("facility");
    assert_eq!(tank.current_level_kg, 125.0);

    let route_response = app
        .oneshot(
            Request::get(format!("/routes/{}", route.0))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(route_response.status(), StatusCode::OK);
    let stored: TransportRoute = read_json(route_response).await;
    assert_eq!(stored.status, RouteStatus::Delivered);
    assert_eq!(stored.destination_storage_id, None);
}

#[tokio::test]
async fn error_classes_map_to_http_statuses() {
    let (app, _storage, _facility, route) = test_app().await;

    let cases = [
        (
            serde_json::json!({ "action": "pause", "routeId": route.0 }),
            StatusCode::BAD_REQUEST,
            ErrorCode::BadRequest,
        ),
        (
            serde_json::json!({ "action": "start" }),
            StatusCode::BAD_REQUEST,
            ErrorCode::BadRequest,
        ),
        (
            serde_json::json!({ "action": "start", "routeId": route.0 + 1000 }),
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
        ),
        (
            serde_json::json!({ "action": "complete", "routeId": route.0 }),
            StatusCode::CONFLICT,
            ErrorCode::StateConflict,
        ),
    ];

    for (body, status, code) in cases {
        let response = app
            .clone()
            .oneshot(delivery_request(body))
            .await
            .expect("response");
        assert_eq!(response.status(), status);
        let dto: DeliveryResponse = read_json(response).await;
        assert!(!dto.success);
        assert_eq!(dto.code, Some(code));
        assert!(!dto.message.is_empty());
    }
}

#[tokio::test]
async fn missing_records_are_404() {
    let (app, _storage, facility, _route) = test_app().await;
    let response = app
        .oneshot(
            Request::get(format!("/facilities/{}", facility.0 + 1))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let err: ApiError = read_json(response).await;
    assert!(matches!(err.code, ErrorCode::NotFound));
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let (app, _storage, _facility, route) = test_app().await;
    let payload = serde_json::json!({
        "action": "start",
        "routeId": route.0,
        "note": "x".repeat(8 * 1024),
    })
    .to_string();
    let request = Request::post("/deliveries")
        .header("content-type", "application/json")
        .header("content-length", payload.len())
        .body(Body::from(payload))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn every_error_code_has_a_distinct_status() {
    let statuses = [
        status_for(ErrorCode::BadRequest),
        status_for(ErrorCode::NotFound),
        status_for(ErrorCode::StateConflict),
        status_for(ErrorCode::InvalidState),
        status_for(ErrorCode::Internal),
    ];
    for (i, a) in statuses.iter().enumerate() {
        for b in &statuses[i + 1..] {
            assert_ne!(a, b);
        }
    }
}
