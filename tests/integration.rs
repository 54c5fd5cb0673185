use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use delivery_dispatch::api::rest::router;
use delivery_dispatch::config::Config;
use delivery_dispatch::models::notification::{NotifyCommand, RealtimeEvent};
use delivery_dispatch::notifications::worker::run_notification_workers;
use delivery_dispatch::notifications::{NotifyError, PushGateway, PushMessage};
use delivery_dispatch::state::AppState;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration};
use tower::ServiceExt;
use uuid::Uuid;

const CUSTOMER: &str = "00000000-0000-0000-0000-0000000000c1";
const BUSINESS: &str = "00000000-0000-0000-0000-0000000000b1";
const DRIVER: &str = "00000000-0000-0000-0000-0000000000d1";
const ADMIN: &str = "00000000-0000-0000-0000-0000000000a1";

#[derive(Default)]
struct RecordingPush {
    sent: Mutex<Vec<PushMessage>>,
}

#[async_trait]
impl PushGateway for RecordingPush {
    async fn push(&self, message: &PushMessage) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct TestApp {
    app: axum::Router,
    state: Arc<AppState>,
    push: Arc<RecordingPush>,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.notify.retry_backoff_ms = 1;
    config
}

fn setup() -> (TestApp, mpsc::Receiver<NotifyCommand>) {
    let push = Arc::new(RecordingPush::default());
    let (state, rx) = AppState::new(test_config(), push.clone());
    let state = Arc::new(state);
    let app = router(state.clone());
    (TestApp { app, state, push }, rx)
}

/// App with the notification workers running.
fn setup_with_workers() -> TestApp {
    let (test_app, rx) = setup();
    tokio::spawn(run_notification_workers(test_app.state.clone(), rx));
    test_app
}

fn request(method: &str, uri: &str, actor: (&str, &str), body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-id", actor.0)
        .header("x-actor-role", actor.1);

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn customer() -> (&'static str, &'static str) {
    (CUSTOMER, "customer")
}

fn business() -> (&'static str, &'static str) {
    (BUSINESS, "business")
}

fn driver() -> (&'static str, &'static str) {
    (DRIVER, "driver")
}

fn admin() -> (&'static str, &'static str) {
    (ADMIN, "admin")
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

fn order_body() -> Value {
    json!({
        "businessId": BUSINESS,
        "items": [
            { "name": "Burrito", "price": 9.5, "quantity": 2 },
            { "name": "Horchata", "price": 3.0, "quantity": 1 }
        ],
        "tax": 1.8,
        "bookingFee": 2.0,
        "deliveryAddress": {
            "placeId": "place-42",
            "location": { "lat": 40.7193, "lng": -73.9928 }
        },
        "recipient": "Casey"
    })
}

async fn create_order(app: &axum::Router) -> Value {
    let response = app
        .clone()
        .oneshot(request("POST", "/orders", customer(), Some(order_body())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn process_order(app: &axum::Router, order_id: &str, status: &str) -> axum::response::Response {
    app.clone()
        .oneshot(request(
            "POST",
            "/orders/business/process",
            business(),
            Some(json!({ "orderId": order_id, "orderStatus": status })),
        ))
        .await
        .unwrap()
}

/// Skips events of other kinds, e.g. a late `OrderRequest`.
async fn next_event(rx: &mut broadcast::Receiver<RealtimeEvent>, kind: &str) -> RealtimeEvent {
    loop {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("realtime event in time")
            .unwrap();
        if event.data.kind == kind {
            return event;
        }
    }
}

async fn wait_for_push(push: &RecordingPush) -> PushMessage {
    for _ in 0..100 {
        if let Some(message) = push.sent.lock().unwrap().first().cloned() {
            return message;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no push was sent");
}

#[tokio::test]
async fn health_returns_ok() {
    let (test_app, _rx) = setup();
    let response = test_app
        .app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["deadLetters"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (test_app, _rx) = setup();
    create_order(&test_app.app).await;

    let response = test_app
        .app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

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
    assert!(body.contains("notification_queue_depth"));
}

#[tokio::test]
async fn missing_actor_headers_return_401() {
    let (test_app, _rx) = setup();
    let response = test_app
        .app
        .oneshot(
            Request::post("/orders")
                .header("content-type", "application/json")
                .body(Body::from(order_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "err.auth");
}

#[tokio::test]
async fn create_order_returns_requested_order() {
    let (test_app, _rx) = setup();
    let order = create_order(&test_app.app).await;

    assert_eq!(order["orderStatus"], "Requested");
    assert_eq!(order["tripStatus"], "None");
    assert_eq!(order["customerId"], CUSTOMER);
    assert_eq!(order["price"], 22.0);
    assert_eq!(order["total"], 25.8);
    assert_eq!(order["number"].as_str().unwrap().len(), 6);
    assert!(order["statusHistory"]["OrderRequest"].is_string());
}

#[tokio::test]
async fn malformed_order_body_returns_bind_error() {
    let (test_app, _rx) = setup();
    let response = test_app
        .app
        .oneshot(request(
            "POST",
            "/orders",
            customer(),
            Some(json!({ "businessId": "not-a-uuid" })),
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    let body = body_json(response).await;
    assert_eq!(body["error"], "err.order.bind");
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let (test_app, _rx) = setup();
    let fake_id = Uuid::nil();
    let response = test_app
        .app
        .oneshot(request("GET", &format!("/orders/{fake_id}"), admin(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "err.order.read");
}

#[tokio::test]
async fn other_customers_cannot_read_an_order() {
    let (test_app, _rx) = setup();
    let order = create_order(&test_app.app).await;
    let id = order["id"].as_str().unwrap();

    let stranger = Uuid::new_v4().to_string();
    let response = test_app
        .app
        .oneshot(request(
            "GET",
            &format!("/orders/{id}"),
            (stranger.as_str(), "customer"),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn new_order_is_announced_on_business_channel() {
    let test_app = setup_with_workers();
    let mut live = test_app.state.realtime.subscribe();

    let order = create_order(&test_app.app).await;

    let event = next_event(&mut live, "OrderRequest").await;
    assert_eq!(event.channel, BUSINESS);
    assert_eq!(event.data.order_id.to_string(), order["id"].as_str().unwrap());
}

#[tokio::test]
async fn accepting_an_order_pushes_to_the_customer() {
    let test_app = setup_with_workers();

    let response = test_app
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/profiles",
            admin(),
            Some(json!({
                "id": CUSTOMER,
                "role": "customer",
                "name": "Casey",
                "pushPlayerId": "casey-phone"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let order = create_order(&test_app.app).await;
    let id = order["id"].as_str().unwrap();

    let response = process_order(&test_app.app, id, "Accepted").await;
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await;

    assert_eq!(accepted["orderStatus"], "Accepted");
    assert_eq!(
        accepted["statusHistory"]["OrderAccepted"],
        accepted["updatedAt"]
    );

    let message = wait_for_push(&test_app.push).await;
    assert_eq!(message.player_ids, vec!["casey-phone".to_string()]);
    assert_eq!(message.body["en"], "Your order is accepted.");
    assert_eq!(message.data.kind, "OrderAccepted");
}

#[tokio::test]
async fn declined_trip_keeps_reason_and_only_notifies_business() {
    let test_app = setup_with_workers();
    let order = create_order(&test_app.app).await;
    let id = order["id"].as_str().unwrap();

    let response = test_app
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/orders/trip/request",
            business(),
            Some(json!({ "orderId": id, "driverId": DRIVER })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut live = test_app.state.realtime.subscribe();
    let response = test_app
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/orders/trip/process",
            driver(),
            Some(json!({ "orderId": id, "tripStatus": "Declined", "reasonCode": 300 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let declined = body_json(response).await;
    assert_eq!(declined["tripStatus"], "Declined");
    assert_eq!(declined["orderStatus"], "Requested");
    assert_eq!(declined["reasonCode"], 300);

    let event = next_event(&mut live, "TripDeclined").await;
    assert_eq!(event.channel, BUSINESS);
    assert!(test_app.push.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn near_drivers_with_nobody_online_is_empty() {
    let (test_app, _rx) = setup();
    let response = test_app
        .app
        .oneshot(request(
            "GET",
            "/orders/trip/nearDrivers?lat=40.7193&lng=-73.9928",
            business(),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn near_drivers_finds_an_online_driver() {
    let (test_app, _rx) = setup();
    let response = test_app
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/drivers/update/location",
            driver(),
            Some(json!({
                "driverId": DRIVER,
                "location": { "lat": 40.7300, "lng": -73.9900 },
                "status": "Online"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = test_app
        .app
        .oneshot(request(
            "GET",
            "/orders/trip/nearDrivers?lat=40.7193&lng=-73.9928",
            business(),
            None,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    let drivers = body.as_array().unwrap();
    assert_eq!(drivers.len(), 1);
    assert_eq!(drivers[0]["driverId"], DRIVER);
    assert!(drivers[0]["distanceM"].as_f64().unwrap() < 8_000.0);
}

#[tokio::test]
async fn drivers_cannot_move_someone_else() {
    let (test_app, _rx) = setup();
    let response = test_app
        .app
        .oneshot(request(
            "POST",
            "/drivers/update/location",
            driver(),
            Some(json!({
                "driverId": Uuid::new_v4(),
                "location": { "lat": 40.73, "lng": -73.99 },
                "status": "Online"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn concurrent_transitions_each_see_their_own_commit() {
    let (test_app, _rx) = setup();
    let order = create_order(&test_app.app).await;
    let id = order["id"].as_str().unwrap().to_string();
    let response = process_order(&test_app.app, &id, "Accepted").await;
    assert_eq!(response.status(), StatusCode::OK);

    let (first, second) = tokio::join!(
        process_order(&test_app.app, &id, "Prepared"),
        process_order(&test_app.app, &id, "Completed"),
    );

    let mut committed = Vec::new();
    for (response, target) in [(first, "Prepared"), (second, "Completed")] {
        if response.status() == StatusCode::OK {
            let body = body_json(response).await;
            assert_eq!(body["orderStatus"], target);
            committed.push((body["version"].as_u64().unwrap(), target));
        } else {
            assert_eq!(response.status(), StatusCode::CONFLICT);
        }
    }
    assert!(!committed.is_empty());

    let (_, last_target) = committed.iter().max_by_key(|(version, _)| *version).unwrap();
    let response = test_app
        .app
        .oneshot(request("GET", &format!("/orders/{id}"), admin(), None))
        .await
        .unwrap();
    let stored = body_json(response).await;
    assert_eq!(stored["orderStatus"], *last_target);
}

#[tokio::test]
async fn invalid_jump_returns_409_with_update_key() {
    let (test_app, _rx) = setup();
    let order = create_order(&test_app.app).await;
    let id = order["id"].as_str().unwrap();

    let response = process_order(&test_app.app, id, "Completed").await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "err.order.update");
}

#[tokio::test]
async fn rating_completes_and_clears_unrated_list() {
    let (test_app, _rx) = setup();
    let order = create_order(&test_app.app).await;
    let id = order["id"].as_str().unwrap();
    process_order(&test_app.app, id, "Accepted").await;

    let response = test_app
        .app
        .clone()
        .oneshot(request("GET", "/orders/unrated", customer(), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = test_app
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/orders/submit/by/user",
            customer(),
            Some(json!({
                "orderId": id,
                "businessRate": 5.0,
                "businessFeedback": "hot and fast",
                "driverRate": 4.0
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rated = body_json(response).await;
    assert_eq!(rated["orderStatus"], "Completed");
    assert_eq!(rated["rated"], true);

    let response = test_app
        .app
        .oneshot(request("GET", "/orders/unrated", customer(), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn listing_is_scoped_to_the_caller() {
    let (test_app, _rx) = setup();
    create_order(&test_app.app).await;
    create_order(&test_app.app).await;

    let response = test_app
        .app
        .clone()
        .oneshot(request("GET", "/orders?sort=-1&count=1", business(), None))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let response = test_app
        .app
        .oneshot(request("GET", "/orders", driver(), None))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn admin_can_delete_and_read_dead_letters() {
    let (test_app, _rx) = setup();
    let order = create_order(&test_app.app).await;
    let id = order["id"].as_str().unwrap();

    let response = test_app
        .app
        .clone()
        .oneshot(request("DELETE", &format!("/orders/{id}"), customer(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = test_app
        .app
        .clone()
        .oneshot(request("DELETE", &format!("/orders/{id}"), admin(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["status"],
        "Order is deleted correctly."
    );

    let response = test_app
        .app
        .oneshot(request("GET", "/notifications/dead-letters", admin(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.as_array().unwrap().is_empty());
}
