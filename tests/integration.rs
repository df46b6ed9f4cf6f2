use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mslk_dispatch::api::rest::router;
use mslk_dispatch::config::Config;
use mslk_dispatch::engine::notifier::run_notification_engine;
use mslk_dispatch::engine::queue::TripEvent;
use mslk_dispatch::models::notification::Recipient;
use mslk_dispatch::state::AppState;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        bcrypt_cost: 4,
        ..Config::default()
    }
}

fn setup() -> (axum::Router, mpsc::Receiver<TripEvent>) {
    let (state, rx) = AppState::new(test_config()).unwrap();
    (router(Arc::new(state)), rx)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn admin_token(app: &axum::Router) -> String {
    let defaults = Config::default();
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": defaults.admin_email, "password": defaults.admin_password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");
    body["token"].as_str().unwrap().to_string()
}

/// Registers a driver and returns `(token, id)`.
async fn register_driver(app: &axum::Router, name: &str, email: &str) -> (String, String) {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/register",
            json!({
                "name": name,
                "email": email,
                "phone": "+33612345678",
                "password": "secret123",
                "vehicle": { "model": "Peugeot 508", "color": "gris", "plate": "GH-456-JK" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

async fn approve_driver(app: &axum::Router, admin: &str, driver_id: &str) {
    let (status, body) = send(
        app,
        authed(
            "PUT",
            &format!("/api/admin/drivers/{driver_id}/approval"),
            admin,
            Some(json!({ "approval_status": "approved" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approval_status"], "approved");
}

async fn driver_status(app: &axum::Router, token: &str) -> Value {
    let (status, body) = send(app, authed("GET", "/api/auth/me", token, None)).await;
    assert_eq!(status, StatusCode::OK);
    body["status"].clone()
}

fn booking(email: &str) -> Value {
    json!({
        "client_name": "Claire Martin",
        "client_phone": "0612345678",
        "client_email": email,
        "pickup": { "address": "Gare de Clermont-Ferrand" },
        "dropoff": { "address": "Aéroport Clermont-Auvergne" },
        "passengers": 2
    })
}

async fn book_trip(app: &axum::Router, body: Value) -> Value {
    let (status, trip) = send(app, json_request("POST", "/api/trips", body)).await;
    assert_eq!(status, StatusCode::CREATED);
    trip
}

async fn assign(app: &axum::Router, admin: &str, trip_id: &str, driver_id: &str, rate: Value) -> (StatusCode, Value) {
    send(
        app,
        authed(
            "POST",
            &format!("/api/admin/trips/{trip_id}/assign"),
            admin,
            Some(json!({ "driver_id": driver_id, "commission_rate": rate })),
        ),
    )
    .await
}

async fn driver_action(app: &axum::Router, token: &str, trip_id: &str, action: &str) -> (StatusCode, Value) {
    send(
        app,
        authed(
            "POST",
            &format!("/api/driver/trips/{trip_id}/{action}"),
            token,
            None,
        ),
    )
    .await
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["trips"], 0);
    assert_eq!(body["drivers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("trips_created_total"));
    assert!(body.contains("events_in_queue"));
}

#[tokio::test]
async fn service_info_exposes_poll_interval() {
    let (app, _rx) = setup();
    let (status, body) = send(&app, get_request("/api")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notification_poll_seconds"], 10);
}

#[tokio::test]
async fn price_preview_matches_reference_route() {
    let (app, _rx) = setup();
    let (status, body) = send(
        &app,
        get_request(
            "/api/trips/calculate-price?pickup_lat=45.77&pickup_lng=3.08&dropoff_lat=45.78&dropoff_lng=3.10",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let distance = body["distance_km"].as_f64().unwrap();
    assert!((distance - 1.91).abs() < 0.05, "distance {distance}");
    assert_eq!(body["price"].as_f64(), Some(8.82));
}

#[tokio::test]
async fn price_preview_without_dropoff_is_rejected() {
    let (app, _rx) = setup();
    let (status, body) = send(
        &app,
        get_request("/api/trips/calculate-price?pickup_lat=45.77&pickup_lng=3.08"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("dropoff"));
}

#[tokio::test]
async fn booking_with_coordinates_stores_preview_distance_and_price() {
    let (app, _rx) = setup();
    let trip = book_trip(
        &app,
        json!({
            "client_name": "Claire Martin",
            "client_phone": "0612345678",
            "client_email": "Claire@Example.com",
            "pickup": { "address": "Place de Jaude", "lat": 45.77, "lng": 3.08 },
            "dropoff": { "address": "Montferrand", "lat": 45.78, "lng": 3.10 }
        }),
    )
    .await;

    assert_eq!(trip["status"], "pending");
    assert_eq!(trip["published"], false);
    assert_eq!(trip["client_email"], "claire@example.com");
    assert_eq!(trip["price"].as_f64(), Some(8.82));
    assert_eq!(trip["distance_km"].as_f64(), Some(1.91));
    assert_eq!(trip["version"], 0);
}

#[tokio::test]
async fn booking_in_the_past_is_rejected() {
    let (app, _rx) = setup();
    let mut body = booking("late@example.com");
    body["pickup_at"] = json!("2020-01-01T08:00:00Z");

    let (status, _) = send(&app, json_request("POST", "/api/trips", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_with_invalid_email_is_rejected() {
    let (app, _rx) = setup();
    let (status, _) = send(&app, json_request("POST", "/api/trips", booking("not-an-email"))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_routes_require_admin_session() {
    let (app, _rx) = setup();
    let (driver, _) = register_driver(&app, "Samir", "samir@example.com").await;

    let response = app.clone().oneshot(get_request("/api/admin/trips")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, authed("GET", "/api/admin/trips", &driver, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "admin only");
}

#[tokio::test]
async fn me_returns_the_logged_in_account() {
    let (app, _rx) = setup();
    let (driver, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;

    let (status, body) = send(&app, authed("GET", "/api/auth/me", &driver, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], driver_id);
    assert_eq!(body["approval_status"], "pending");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn duplicate_staff_email_is_rejected() {
    let (app, _rx) = setup();
    register_driver(&app, "Samir", "samir@example.com").await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            json!({
                "name": "Other",
                "email": "SAMIR@example.com",
                "phone": "+33600000000",
                "password": "secret123"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "samir@example.com", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn assign_then_refuse_returns_trip_to_pending() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (driver, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();

    let (status, assigned) = assign(&app, &admin, trip_id, &driver_id, json!(0.20)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["status"], "assigned");
    assert_eq!(assigned["driver_id"], driver_id.as_str());
    assert_eq!(assigned["commission_rate"].as_f64(), Some(0.2));
    assert_eq!(assigned["driver_vehicle"], "Peugeot 508 gris GH-456-JK");

    let (status, refused) = driver_action(&app, &driver, trip_id, "refuse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refused["status"], "pending");
    assert!(refused["driver_id"].is_null());
    assert!(refused["driver_name"].is_null());
}

#[tokio::test]
async fn full_trip_flow_credits_driver_ledger() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (driver, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();
    assert_eq!(trip["price"].as_f64(), Some(0.0));

    let (status, priced) = send(
        &app,
        authed(
            "PUT",
            &format!("/api/admin/trips/{trip_id}/price"),
            &admin,
            Some(json!({ "price": 50 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(priced["price"].as_f64(), Some(50.0));

    let (status, _) = assign(&app, &admin, trip_id, &driver_id, json!(0.15)).await;
    assert_eq!(status, StatusCode::OK);

    for (action, expected) in [
        ("accept", "accepted"),
        ("approach", "approaching"),
        ("start", "in_progress"),
        ("complete", "completed"),
    ] {
        let (status, body) = driver_action(&app, &driver, trip_id, action).await;
        assert_eq!(status, StatusCode::OK, "{action}: {body}");
        assert_eq!(body["status"], expected);
    }

    let (status, statement) = send(
        &app,
        authed(
            "GET",
            &format!("/api/admin/drivers/{driver_id}/ledger"),
            &admin,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(statement["balanced"], true);
    assert_eq!(statement["materialized"]["total_trips"], 1);
    assert_eq!(statement["materialized"]["total_revenue"].as_f64(), Some(50.0));
    assert_eq!(statement["materialized"]["total_commission"].as_f64(), Some(7.5));
    assert_eq!(statement["entries"].as_array().unwrap().len(), 1);

    let (status, reset) = send(
        &app,
        authed(
            "POST",
            &format!("/api/admin/drivers/{driver_id}/reset-commission"),
            &admin,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reset["total_commission"].as_f64(), Some(0.0));
    assert_eq!(reset["total_revenue"].as_f64(), Some(50.0));

    let (_, stats) = send(&app, authed("GET", "/api/driver/stats", &driver, None)).await;
    assert_eq!(stats["completed_trips"], 1);
    assert_eq!(stats["daily_revenue"].as_f64(), Some(50.0));
    assert_eq!(stats["commission_due"].as_f64(), Some(7.5));
}

#[tokio::test]
async fn negative_total_override_is_rejected() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (_, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;

    let (status, _) = send(
        &app,
        authed(
            "PUT",
            &format!("/api/admin/drivers/{driver_id}/total-revenue"),
            &admin,
            Some(json!({ "value": -10 })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trip_total_beyond_signed_range_is_rejected() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (_, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;

    let (status, _) = send(
        &app,
        authed(
            "PUT",
            &format!("/api/admin/drivers/{driver_id}/total-trips"),
            &admin,
            Some(json!({ "value": u64::MAX })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, statement) = send(
        &app,
        authed(
            "GET",
            &format!("/api/admin/drivers/{driver_id}/ledger"),
            &admin,
            None,
        ),
    )
    .await;
    assert_eq!(statement["balanced"], true);
    assert_eq!(statement["materialized"]["total_trips"], 0);
    assert!(statement["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn amounts_above_cap_are_rejected() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (_, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        authed(
            "PUT",
            &format!("/api/admin/trips/{trip_id}/price"),
            &admin,
            Some(json!({ "price": 2_000_000_000 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        authed(
            "PUT",
            &format!("/api/admin/drivers/{driver_id}/total-revenue"),
            &admin,
            Some(json!({ "value": 2_000_000_000 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn driver_status_follows_engaged_trips() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (driver, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;

    let mut trip_ids = Vec::new();
    for email in ["claire@example.com", "paul@example.com", "ines@example.com"] {
        let trip = book_trip(&app, booking(email)).await;
        let trip_id = trip["id"].as_str().unwrap().to_string();
        let (status, _) = assign(&app, &admin, &trip_id, &driver_id, json!(0.15)).await;
        assert_eq!(status, StatusCode::OK);
        trip_ids.push(trip_id);
    }
    let (driving, refused, cancelled) = (&trip_ids[0], &trip_ids[1], &trip_ids[2]);

    let (status, _) = driver_action(&app, &driver, driving, "accept").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(driver_status(&app, &driver).await, "busy");

    let (status, _) = driver_action(&app, &driver, cancelled, "accept").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = driver_action(&app, &driver, driving, "start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(driver_status(&app, &driver).await, "en_route");

    let (status, _) = driver_action(&app, &driver, refused, "refuse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(driver_status(&app, &driver).await, "en_route");

    let (status, _) = send(
        &app,
        authed("POST", &format!("/api/admin/trips/{cancelled}/cancel"), &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(driver_status(&app, &driver).await, "en_route");

    let (status, _) = driver_action(&app, &driver, driving, "complete").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(driver_status(&app, &driver).await, "available");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_claims_have_a_single_winner() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (samir, samir_id) = register_driver(&app, "Samir", "samir@example.com").await;
    let (lina, lina_id) = register_driver(&app, "Lina", "lina@example.com").await;
    approve_driver(&app, &admin, &samir_id).await;
    approve_driver(&app, &admin, &lina_id).await;

    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        authed("POST", &format!("/api/admin/trips/{trip_id}/publish"), &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (first, second) = tokio::join!(
        driver_action(&app, &samir, trip_id, "accept"),
        driver_action(&app, &lina, trip_id, "accept"),
    );

    let (winner, loser) = if first.0 == StatusCode::OK {
        (first, second)
    } else {
        (second, first)
    };
    assert_eq!(winner.0, StatusCode::OK);
    assert!(
        matches!(loser.0, StatusCode::FORBIDDEN | StatusCode::CONFLICT),
        "loser got {}",
        loser.0
    );

    let (_, trips) = send(&app, authed("GET", "/api/admin/trips", &admin, None)).await;
    let stored = &trips[0];
    assert_eq!(stored["status"], "accepted");
    assert_eq!(stored["driver_id"], winner.1["driver_id"]);
    assert_eq!(stored["version"], winner.1["version"]);
}

#[tokio::test]
async fn completing_an_assigned_trip_conflicts() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (driver, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();
    assign(&app, &admin, trip_id, &driver_id, json!(0.15)).await;

    let (status, body) = driver_action(&app, &driver, trip_id, "complete").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "cannot complete a trip that is assigned");
}

#[tokio::test]
async fn cancelled_trip_is_immutable() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();

    let (status, cancelled) = send(
        &app,
        authed("POST", &format!("/api/admin/trips/{trip_id}/cancel"), &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = send(
        &app,
        authed("POST", &format!("/api/admin/trips/{trip_id}/publish"), &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        authed(
            "PUT",
            &format!("/api/admin/trips/{trip_id}/price"),
            &admin,
            Some(json!({ "price": 40 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        authed("DELETE", &format!("/api/admin/trips/{trip_id}"), &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn driver_cannot_act_on_another_drivers_trip() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (_, samir_id) = register_driver(&app, "Samir", "samir@example.com").await;
    let (lina, _) = register_driver(&app, "Lina", "lina@example.com").await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();
    assign(&app, &admin, trip_id, &samir_id, json!(0.15)).await;

    let (status, _) = driver_action(&app, &lina, trip_id, "accept").await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stale_expected_version_conflicts() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();
    let uri = format!("/api/admin/trips/{trip_id}/price");

    let (status, _) = send(
        &app,
        authed("PUT", &uri, &admin, Some(json!({ "price": 30, "expected_version": 5 }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        authed("PUT", &uri, &admin, Some(json!({ "price": 30, "expected_version": 0 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);
}

#[tokio::test]
async fn approved_driver_claims_published_trip_first_wins() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (samir, samir_id) = register_driver(&app, "Samir", "samir@example.com").await;
    let (lina, lina_id) = register_driver(&app, "Lina", "lina@example.com").await;
    approve_driver(&app, &admin, &samir_id).await;
    approve_driver(&app, &admin, &lina_id).await;

    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();

    let (status, _) = driver_action(&app, &samir, trip_id, "accept").await;
    assert_eq!(status, StatusCode::CONFLICT, "unpublished trips cannot be claimed");

    let (status, published) = send(
        &app,
        authed("POST", &format!("/api/admin/trips/{trip_id}/publish"), &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["published"], true);

    let (_, visible) = send(&app, authed("GET", "/api/driver/trips", &lina, None)).await;
    assert_eq!(visible.as_array().unwrap().len(), 1);

    let (status, claimed) = driver_action(&app, &samir, trip_id, "accept").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claimed["status"], "accepted");
    assert_eq!(claimed["driver_id"], samir_id.as_str());
    assert_eq!(claimed["commission_rate"].as_f64(), Some(0.15));

    let (status, _) = driver_action(&app, &lina, trip_id, "accept").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, visible) = send(&app, authed("GET", "/api/driver/trips", &lina, None)).await;
    assert!(visible.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unapproved_driver_cannot_claim() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (driver, _) = register_driver(&app, "Samir", "samir@example.com").await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();
    send(
        &app,
        authed("POST", &format!("/api/admin/trips/{trip_id}/publish"), &admin, None),
    )
    .await;

    let (status, _) = driver_action(&app, &driver, trip_id, "accept").await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn driver_with_live_trip_cannot_be_deleted() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (_, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();
    assign(&app, &admin, trip_id, &driver_id, json!(0.15)).await;
    let driver_uri = format!("/api/admin/drivers/{driver_id}");

    let (status, _) = send(&app, authed("DELETE", &driver_uri, &admin, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(
        &app,
        authed("POST", &format!("/api/admin/trips/{trip_id}/cancel"), &admin, None),
    )
    .await;

    let (status, _) = send(&app, authed("DELETE", &driver_uri, &admin, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, trips) = send(&app, authed("GET", "/api/admin/trips", &admin, None)).await;
    assert_eq!(trips[0]["driver_name"], "Samir");

    let (status, _) = send(&app, authed("DELETE", &driver_uri, &admin, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_trip_listing_filters_by_status_and_suggests_price() {
    let mut config = test_config();
    config.auto_pricing = false;
    let (state, _rx) = AppState::new(config).unwrap();
    let app = router(Arc::new(state));
    let admin = admin_token(&app).await;

    book_trip(
        &app,
        json!({
            "client_name": "Claire Martin",
            "client_phone": "0612345678",
            "client_email": "claire@example.com",
            "pickup": { "address": "Place de Jaude", "lat": 45.77, "lng": 3.08 },
            "dropoff": { "address": "Montferrand", "lat": 45.78, "lng": 3.10 }
        }),
    )
    .await;
    let other = book_trip(&app, booking("paul@example.com")).await;
    let other_id = other["id"].as_str().unwrap();
    send(
        &app,
        authed("POST", &format!("/api/admin/trips/{other_id}/cancel"), &admin, None),
    )
    .await;

    let (status, pending) = send(
        &app,
        authed("GET", "/api/admin/trips?status=pending", &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["price"].as_f64(), Some(0.0));
    assert_eq!(pending[0]["suggested_price"].as_f64(), Some(8.82));

    let (status, _) = send(
        &app,
        authed("GET", "/api/admin/trips?status=parked", &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, stats) = send(&app, authed("GET", "/api/admin/stats", &admin, None)).await;
    assert_eq!(stats["total_trips"], 2);
    assert_eq!(stats["pending_trips"], 1);
}

#[tokio::test]
async fn ring_targets_eligible_drivers_of_pending_trip() {
    let (app, _rx) = setup();
    let admin = admin_token(&app).await;
    let (_, samir_id) = register_driver(&app, "Samir", "samir@example.com").await;
    register_driver(&app, "Lina", "lina@example.com").await;
    approve_driver(&app, &admin, &samir_id).await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        authed("POST", &format!("/api/admin/trips/{trip_id}/ring"), &admin, None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["drivers_rung"], 1);
}

#[tokio::test]
async fn notifications_reach_recipients_until_acknowledged() {
    let (state, rx) = AppState::new(test_config()).unwrap();
    let shared = Arc::new(state);
    tokio::spawn(run_notification_engine(shared.clone(), rx));
    let app = router(shared.clone());

    let admin = admin_token(&app).await;
    let (status, registered) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/client/register",
            json!({
                "name": "Claire Martin",
                "email": "claire@example.com",
                "phone": "0612345678",
                "password": "secret123"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let client = registered["token"].as_str().unwrap().to_string();

    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();
    send(
        &app,
        authed(
            "PUT",
            &format!("/api/admin/trips/{trip_id}/price"),
            &admin,
            Some(json!({ "price": 45 })),
        ),
    )
    .await;

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    let (_, admin_inbox) = send(&app, authed("GET", "/api/admin/notifications", &admin, None)).await;
    let admin_inbox = admin_inbox.as_array().unwrap();
    assert_eq!(admin_inbox.len(), 1);
    assert_eq!(admin_inbox[0]["kind"], "new_trip");
    assert_eq!(admin_inbox[0]["trip_id"], trip_id);

    let (_, client_inbox) = send(&app, authed("GET", "/api/client/notifications", &client, None)).await;
    let client_inbox = client_inbox.as_array().unwrap();
    assert_eq!(client_inbox.len(), 1);
    assert_eq!(client_inbox[0]["kind"], "price_confirmed");

    // Fetching again does not consume.
    let (_, again) = send(&app, authed("GET", "/api/admin/notifications", &admin, None)).await;
    assert_eq!(again.as_array().unwrap().len(), 1);

    let notification_id = admin_inbox[0]["id"].as_str().unwrap();
    let read_uri = format!("/api/admin/notifications/{notification_id}/read");
    for _ in 0..2 {
        let (status, body) = send(&app, authed("POST", &read_uri, &admin, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["read"], true);
    }

    let (_, after) = send(&app, authed("GET", "/api/admin/notifications", &admin, None)).await;
    assert!(after.as_array().unwrap().is_empty());

    let (status, _) = send(
        &app,
        authed(
            "POST",
            &format!("/api/client/notifications/{notification_id}/read"),
            &client,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completion_notifies_client_and_driver() {
    let (state, rx) = AppState::new(test_config()).unwrap();
    let shared = Arc::new(state);
    tokio::spawn(run_notification_engine(shared.clone(), rx));
    let app = router(shared.clone());

    let admin = admin_token(&app).await;
    let (driver, driver_id) = register_driver(&app, "Samir", "samir@example.com").await;
    let trip = book_trip(&app, booking("claire@example.com")).await;
    let trip_id = trip["id"].as_str().unwrap();
    send(
        &app,
        authed(
            "PUT",
            &format!("/api/admin/trips/{trip_id}/price"),
            &admin,
            Some(json!({ "price": 60 })),
        ),
    )
    .await;
    assign(&app, &admin, trip_id, &driver_id, json!(0.10)).await;
    for action in ["accept", "start", "complete"] {
        let (status, _) = driver_action(&app, &driver, trip_id, action).await;
        assert_eq!(status, StatusCode::OK, "{action}");
    }

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    let (_, inbox) = send(&app, authed("GET", "/api/driver/notifications", &driver, None)).await;
    let kinds: Vec<&str> = inbox
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"trip_assigned"));
    assert!(kinds.contains(&"collect_payment"));

    let client_kinds: Vec<String> = shared
        .notifications
        .iter()
        .filter(|entry| entry.recipient == Recipient::Client("claire@example.com".to_string()))
        .map(|entry| entry.kind.as_str().to_string())
        .collect();
    assert!(client_kinds.contains(&"payment_due".to_string()));
}
