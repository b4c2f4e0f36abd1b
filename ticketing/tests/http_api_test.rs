//! Router tests for the ticketing HTTP API over in-memory backends.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use ticketing::{AppState, build_router};
use ticketing_core::webhook::WebhookVerifier;
use ticketing_core::{AttendeeId, BookingStore, Event, Quantity, RetryPolicy};
use ticketing_testing::{EventBuilder, InMemoryBookingStore, InMemoryPaymentGateway, ManualClock, epoch};
use tower::ServiceExt;
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "whsec_router_test";

struct App {
    router: Router,
    store: InMemoryBookingStore,
    gateway: InMemoryPaymentGateway,
}

fn app() -> App {
    let store = InMemoryBookingStore::new();
    let gateway = InMemoryPaymentGateway::new();
    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(gateway.clone()),
        Arc::new(ManualClock::new(epoch())),
        RetryPolicy::none(),
    )
    .with_webhooks(WebhookVerifier::new(WEBHOOK_SECRET, Duration::from_secs(300)));

    App {
        router: build_router(state),
        store,
        gateway,
    }
}

struct Reply {
    status: StatusCode,
    request_id: Option<String>,
    body: Value,
}

async fn send(app: &App, request: Request<Body>) -> Reply {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .map(|v| v.to_str().unwrap().to_owned());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Reply {
        status,
        request_id,
        body,
    }
}

fn request(method: &str, uri: &str, user: Option<AttendeeId>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn seeded(app: &App, event: Event) -> Event {
    app.store.put_event(event.clone()).await;
    event
}

async fn book(app: &App, event: &Event, user: AttendeeId, quantity: i64) -> Reply {
    send(
        app,
        request(
            "POST",
            &format!("/bookings/{}", event.id),
            Some(user),
            Some(json!({ "quantity": quantity })),
        ),
    )
    .await
}

fn event_ids(reply: &Reply) -> Vec<String> {
    reply
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["id"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn booking_returns_created_with_ledger_fields() {
    let app = app();
    let event = seeded(&app, EventBuilder::new().capacity(10).price_cents(2500).build()).await;

    let reply = book(&app, &event, AttendeeId::new(), 2).await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["message"], "Booking created successfully");
    assert_eq!(reply.body["incrementedBy"], 2);
    assert_eq!(reply.body["reservedCount"], 2);
    assert_eq!(reply.body["booking"]["quantity"], 2);
    assert_eq!(reply.body["booking"]["totalPriceCents"], 5000);
    assert_eq!(reply.body["booking"]["paymentStatus"], "pending");
    assert_eq!(reply.body["booking"]["event"]["title"], "Rust Meetup");
}

#[tokio::test]
async fn booking_without_identity_is_unauthorized() {
    let app = app();
    let event = seeded(&app, EventBuilder::new().build()).await;

    let reply = send(
        &app,
        request(
            "POST",
            &format!("/bookings/{}", event.id),
            None,
            Some(json!({ "quantity": 1 })),
        ),
    )
    .await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.reservation_count().await, 0);
}

#[tokio::test]
async fn invalid_input_is_a_bad_request() {
    let app = app();
    let event = seeded(&app, EventBuilder::new().build()).await;
    let user = AttendeeId::new();

    let bad_id = send(
        &app,
        request("POST", "/bookings/not-a-uuid", Some(user), Some(json!({ "quantity": 1 }))),
    )
    .await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);

    let zero = book(&app, &event, user, 0).await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
    assert_eq!(zero.body["code"], "INVALID_QUANTITY");

    let missing = send(
        &app,
        request("POST", &format!("/bookings/{}", event.id), Some(user), Some(json!({}))),
    )
    .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["code"], "INVALID_QUANTITY");
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let app = app();

    let reply = send(
        &app,
        request(
            "POST",
            &format!("/bookings/{}", Uuid::new_v4()),
            Some(AttendeeId::new()),
            Some(json!({ "quantity": 1 })),
        ),
    )
    .await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn last_seat_goes_to_first_attendee() {
    let app = app();
    let event = seeded(&app, EventBuilder::new().capacity(1).build()).await;

    let first = book(&app, &event, AttendeeId::new(), 1).await;
    let second = book(&app, &event, AttendeeId::new(), 1).await;

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.body["code"], "CAPACITY_EXCEEDED");
    assert_eq!(second.body["details"]["remaining"], 0);
    assert_eq!(second.body["message"], "Not enough spots available. Only 0 spots left");
}

#[tokio::test]
async fn second_booking_by_same_attendee_is_refused() {
    let app = app();
    let event = seeded(&app, EventBuilder::new().capacity(10).build()).await;
    let user = AttendeeId::new();

    assert_eq!(book(&app, &event, user, 1).await.status, StatusCode::CREATED);
    let again = book(&app, &event, user, 1).await;

    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.body["code"], "DUPLICATE_RESERVATION");
    let stored = app.store.event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.reserved_count, 1);
}

#[tokio::test]
async fn only_the_holder_may_cancel() {
    let app = app();
    let event = seeded(&app, EventBuilder::new().capacity(10).build()).await;
    let holder = AttendeeId::new();
    let booked = book(&app, &event, holder, 3).await;
    let id = booked.body["booking"]["id"].as_str().unwrap().to_owned();

    let stranger = send(
        &app,
        request("DELETE", &format!("/bookings/{id}"), Some(AttendeeId::new()), None),
    )
    .await;
    assert_eq!(stranger.status, StatusCode::FORBIDDEN);
    assert_eq!(app.store.event(event.id).await.unwrap().unwrap().reserved_count, 3);

    let owner = send(&app, request("DELETE", &format!("/bookings/{id}"), Some(holder), None)).await;
    assert_eq!(owner.status, StatusCode::OK);
    assert_eq!(owner.body["decrementedBy"], 3);
    assert_eq!(app.store.event(event.id).await.unwrap().unwrap().reserved_count, 0);

    let gone = send(&app, request("DELETE", &format!("/bookings/{id}"), Some(holder), None)).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_may_cancel_any_booking() {
    let app = app();
    let event = seeded(&app, EventBuilder::new().build()).await;
    let booked = book(&app, &event, AttendeeId::new(), 1).await;
    let id = booked.body["booking"]["id"].as_str().unwrap().to_owned();

    let mut cancel = request("DELETE", &format!("/bookings/{id}"), Some(AttendeeId::new()), None);
    cancel
        .headers_mut()
        .insert("X-User-Role", "admin".parse().unwrap());
    let reply = send(&app, cancel).await;

    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn listing_returns_only_the_callers_bookings() {
    let app = app();
    let first = seeded(&app, EventBuilder::new().build()).await;
    let second = seeded(&app, EventBuilder::new().build()).await;
    let user = AttendeeId::new();
    book(&app, &first, user, 1).await;
    book(&app, &second, user, 2).await;
    book(&app, &first, AttendeeId::new(), 1).await;

    let reply = send(&app, request("GET", "/bookings", Some(user), None)).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["count"], 2);
    assert_eq!(reply.body["bookings"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn verifying_a_payment_twice_settles_once() {
    let app = app();
    let event = seeded(&app, EventBuilder::new().capacity(5).price_cents(5000).build()).await;
    let user = AttendeeId::new();
    let reference = app
        .gateway
        .complete(event.id, user, Quantity::new(2).unwrap());
    let body = json!({ "paymentReference": reference.as_str() });

    let first = send(&app, request("POST", "/payments/verify", Some(user), Some(body.clone()))).await;
    let second = send(&app, request("POST", "/payments/verify", Some(user), Some(body))).await;

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.body["alreadyProcessed"], false);
    assert_eq!(first.body["booking"]["paymentStatus"], "success");
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["alreadyProcessed"], true);
    assert_eq!(second.body["booking"]["id"], first.body["booking"]["id"]);
    assert_eq!(app.store.event(event.id).await.unwrap().unwrap().reserved_count, 2);
}

#[tokio::test]
async fn unpaid_or_unknown_sessions_are_refused() {
    let app = app();
    let event = seeded(&app, EventBuilder::new().price_cents(5000).build()).await;
    let user = AttendeeId::new();
    let open = app.gateway.open(event.id, user, Quantity::new(1).unwrap());

    let unpaid = send(
        &app,
        request("POST", "/payments/verify", Some(user), Some(json!({ "paymentReference": open.as_str() }))),
    )
    .await;
    let unknown = send(
        &app,
        request("POST", "/payments/verify", Some(user), Some(json!({ "paymentReference": "cs_missing" }))),
    )
    .await;
    let missing = send(&app, request("POST", "/payments/verify", Some(user), Some(json!({})))).await;

    assert_eq!(unpaid.status, StatusCode::BAD_REQUEST);
    assert_eq!(unpaid.body["code"], "PAYMENT_NOT_COMPLETED");
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.reservation_count().await, 0);
}

#[tokio::test]
async fn webhook_requires_a_valid_signature() {
    let app = app();
    let payload = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;
    let signer = WebhookVerifier::new(WEBHOOK_SECRET, Duration::from_secs(300));
    let good = signer.sign(payload, epoch().timestamp()).unwrap();

    let forged = Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .header("Stripe-Signature", format!("t={},v1=deadbeef", epoch().timestamp()))
        .body(Body::from(payload.as_slice()))
        .unwrap();
    let signed = Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .header("Stripe-Signature", good)
        .body(Body::from(payload.as_slice()))
        .unwrap();

    let rejected = send(&app, forged).await;
    let accepted = send(&app, signed).await;

    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(accepted.status, StatusCode::OK);
    assert_eq!(accepted.body["received"], true);
}

#[tokio::test]
async fn events_can_be_published_edited_and_deleted() {
    let app = app();
    let owner = AttendeeId::new();
    let starts_at = epoch() + chrono::Duration::days(7);

    let created = send(
        &app,
        request(
            "POST",
            "/events",
            Some(owner),
            Some(json!({
                "title": "Launch Party",
                "location": "Rooftop",
                "startsAt": starts_at,
                "priceCents": 1000,
                "capacity": 3
            })),
        ),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["event"]["id"].as_str().unwrap().to_owned();

    let event = app.store.event(ticketing_core::EventId::from_uuid(id.parse().unwrap())).await.unwrap().unwrap();
    book(&app, &event, AttendeeId::new(), 2).await;

    let shrink = send(
        &app,
        request("PATCH", &format!("/events/{id}"), Some(owner), Some(json!({ "capacity": 1 }))),
    )
    .await;
    assert_eq!(shrink.status, StatusCode::BAD_REQUEST);
    assert_eq!(shrink.body["code"], "CAPACITY_BELOW_RESERVED");

    let stranger = send(
        &app,
        request("PATCH", &format!("/events/{id}"), Some(AttendeeId::new()), Some(json!({ "title": "Mine" }))),
    )
    .await;
    assert_eq!(stranger.status, StatusCode::FORBIDDEN);

    let fetched = send(&app, request("GET", &format!("/events/{id}"), None, None)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["reservedCount"], 2);
    assert_eq!(fetched.body["remaining"], 1);

    let deleted = send(&app, request("DELETE", &format!("/events/{id}"), Some(owner), None)).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["bookingsRemoved"], 1);
    assert_eq!(app.store.reservation_count().await, 0);
}

#[tokio::test]
async fn events_are_listed_for_everyone_and_per_owner() {
    let app = app();
    let owner = AttendeeId::new();
    let later = seeded(
        &app,
        EventBuilder::new()
            .owner(owner)
            .starts_at(epoch() + chrono::Duration::days(60))
            .build(),
    )
    .await;
    let sooner = seeded(&app, EventBuilder::new().owner(owner).build()).await;
    let other = seeded(
        &app,
        EventBuilder::new()
            .starts_at(epoch() + chrono::Duration::days(45))
            .build(),
    )
    .await;

    let all = send(&app, request("GET", "/events", None, None)).await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(
        event_ids(&all),
        vec![sooner.id.to_string(), other.id.to_string(), later.id.to_string()]
    );

    let mine = send(&app, request("GET", "/events/mine", Some(owner), None)).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(event_ids(&mine), vec![sooner.id.to_string(), later.id.to_string()]);

    let anonymous = send(&app, request("GET", "/events/mine", None, None)).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let stranger = send(&app, request("GET", "/events/mine", Some(AttendeeId::new()), None)).await;
    assert_eq!(stranger.body, json!([]));
}

#[tokio::test]
async fn events_cannot_start_in_the_past() {
    let app = app();
    let owner = AttendeeId::new();

    let created = send(
        &app,
        request(
            "POST",
            "/events",
            Some(owner),
            Some(json!({
                "title": "Retro Night",
                "location": "Basement",
                "startsAt": epoch() - chrono::Duration::hours(1),
            })),
        ),
    )
    .await;
    assert_eq!(created.status, StatusCode::BAD_REQUEST);
    assert_eq!(created.body["code"], "INVALID_EVENT");

    let event = seeded(&app, EventBuilder::new().owner(owner).build()).await;
    let moved = send(
        &app,
        request(
            "PATCH",
            &format!("/events/{}", event.id),
            Some(owner),
            Some(json!({ "startsAt": epoch() - chrono::Duration::days(1) })),
        ),
    )
    .await;
    assert_eq!(moved.status, StatusCode::BAD_REQUEST);
    assert_eq!(moved.body["code"], "INVALID_EVENT");
    assert_eq!(app.store.event(event.id).await.unwrap().unwrap().starts_at, event.starts_at);
}

#[tokio::test]
async fn health_checks_and_request_ids() {
    let app = app();

    let health = send(&app, request("GET", "/health", None, None)).await;
    let ready = send(&app, request("GET", "/ready", None, None)).await;

    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(ready.status, StatusCode::OK);
    assert_eq!(ready.body["status"], "ready");
    assert!(health.request_id.is_some_and(|id| Uuid::parse_str(&id).is_ok()));

    app.store.set_unavailable(true);
    let down = send(&app, request("GET", "/ready", None, None)).await;
    assert_eq!(down.status, StatusCode::SERVICE_UNAVAILABLE);
}
