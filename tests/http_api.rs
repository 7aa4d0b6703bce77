use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use ulid::Ulid;

use homestay::engine::{Engine, FixedClock};
use homestay::http;

// ── Test infrastructure ──────────────────────────────────────

fn start_app() -> Router {
    let dir = std::env::temp_dir().join(format!("homestay_http_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let clock = Arc::new(FixedClock::on("2024-05-01".parse().unwrap()));
    let engine = Arc::new(Engine::new(dir.join("homestay.wal"), clock).unwrap());
    http::router(engine, 64)
}

struct As<'a> {
    id: &'a str,
    role: &'a str,
}

const ANA_HOST: As<'static> = As { id: "ana", role: "host" };
const BEN_GUEST: As<'static> = As { id: "ben", role: "guest" };
const CY_GUEST: As<'static> = As { id: "cy", role: "guest" };
const ROOT: As<'static> = As { id: "root", role: "admin" };

async fn call(app: &Router, method: Method, uri: &str, who: Option<&As<'_>>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(who) = who {
        req = req.header("x-user-id", who.id).header("x-user-role", who.role);
    }
    let req = match body {
        Some(v) => req
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_listing(app: &Router) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/listings",
        Some(&ANA_HOST),
        Some(json!({ "title": "Lake house", "pricePerNight": 120, "maxGuests": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn book(app: &Router, who: &As<'_>, listing: &str, start: &str, end: &str) -> (StatusCode, Value) {
    call(
        app,
        Method::POST,
        "/bookings",
        Some(who),
        Some(json!({ "listingId": listing, "startDate": start, "endDate": end, "guestCount": 2 })),
    )
    .await
}

// ── Envelope & authentication ────────────────────────────────

#[tokio::test]
async fn health_is_open() {
    let app = start_app();
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn missing_principal_is_unauthenticated() {
    let app = start_app();
    let (status, body) = call(&app, Method::GET, "/bookings/my-bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
    assert!(body.get("data").is_none());

    let bogus = As { id: "x", role: "superuser" };
    let (status, _) = call(&app, Method::GET, "/bookings/my-bookings", Some(&bogus), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guest_role_cannot_reach_host_routes() {
    let app = start_app();
    let (status, _) = call(&app, Method::GET, "/bookings/host/bookings", Some(&BEN_GUEST), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::POST,
        "/listings",
        Some(&BEN_GUEST),
        Some(json!({ "title": "Tent", "pricePerNight": 5, "maxGuests": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_input_is_bad_request() {
    let app = start_app();
    let listing = create_listing(&app).await;

    let (status, body) = call(&app, Method::POST, "/bookings", Some(&BEN_GUEST), Some(json!({ "listingId": listing })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(&app, Method::GET, "/bookings/not-a-ulid", Some(&BEN_GUEST), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/listings/{listing}/availability?start=soon");
    let (status, _) = call(&app, Method::GET, &uri, Some(&BEN_GUEST), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Booking flow ─────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle_over_http() {
    let app = start_app();
    let listing = create_listing(&app).await;

    let (status, body) = book(&app, &BEN_GUEST, &listing, "2024-06-01", "2024-06-05").await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["totalPrice"], 480);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        Method::PATCH,
        &format!("/bookings/{id}/status"),
        Some(&ANA_HOST),
        Some(json!({ "status": "confirmed", "notes": "Welcome!" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "confirmed");
    assert_eq!(body["data"]["hostNotes"], "Welcome!");

    let (status, body) = call(&app, Method::GET, &format!("/bookings/{id}"), Some(&BEN_GUEST), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["guestId"], "ben");

    let (status, body) = call(&app, Method::GET, "/bookings/my-bookings", Some(&BEN_GUEST), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = call(&app, Method::GET, "/bookings/host/bookings", Some(&ANA_HOST), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], id.as_str());

    let (status, body) = call(&app, Method::PATCH, &format!("/bookings/{id}/cancel"), Some(&BEN_GUEST), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    // Terminal: no way back, whoever asks.
    let (status, _) = call(
        &app,
        Method::PATCH,
        &format!("/bookings/{id}/status"),
        Some(&ANA_HOST),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn overlapping_booking_conflicts() {
    let app = start_app();
    let listing = create_listing(&app).await;

    let (status, _) = book(&app, &BEN_GUEST, &listing, "2024-06-01", "2024-06-05").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = book(&app, &CY_GUEST, &listing, "2024-06-04", "2024-06-06").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, _) = book(&app, &CY_GUEST, &listing, "2024-06-05", "2024-06-08").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn concurrent_http_bookings_yield_one_winner() {
    let app = start_app();
    let listing = create_listing(&app).await;

    let attempts = (0..16).map(|i| {
        let app = app.clone();
        let listing = listing.clone();
        tokio::spawn(async move {
            let id = format!("racer-{i}");
            let who = As { id: &id, role: "guest" };
            book(&app, &who, &listing, "2024-07-01", "2024-07-04").await.0
        })
    });
    let mut created = 0;
    let mut conflicts = 0;
    for handle in attempts.collect::<Vec<_>>() {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 15);
}

#[tokio::test]
async fn validation_errors() {
    let app = start_app();
    let listing = create_listing(&app).await;

    let (status, _) = book(&app, &BEN_GUEST, &listing, "2024-06-05", "2024-06-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = book(&app, &BEN_GUEST, &listing, "2024-04-01", "2024-04-03").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(&BEN_GUEST),
        Some(json!({ "listingId": listing, "startDate": "2024-06-01", "endDate": "2024-06-02", "guestCount": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = book(&app, &BEN_GUEST, &Ulid::new().to_string(), "2024-06-01", "2024-06-02").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ownership_enforced() {
    let app = start_app();
    let listing = create_listing(&app).await;
    let (_, body) = book(&app, &BEN_GUEST, &listing, "2024-06-01", "2024-06-03").await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, Method::GET, &format!("/bookings/{id}"), Some(&CY_GUEST), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::PATCH, &format!("/bookings/{id}/cancel"), Some(&CY_GUEST), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let other_host = As { id: "dee", role: "host" };
    let (status, _) = call(
        &app,
        Method::PATCH,
        &format!("/bookings/{id}/status"),
        Some(&other_host),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::GET, &format!("/bookings/{id}"), Some(&ROOT), None).await;
    assert_eq!(status, StatusCode::OK);
}

// ── Listings ─────────────────────────────────────────────────

#[tokio::test]
async fn availability_and_calendar() {
    let app = start_app();
    let listing = create_listing(&app).await;
    book(&app, &BEN_GUEST, &listing, "2024-06-03", "2024-06-05").await;

    let uri = format!("/listings/{listing}/availability?start=2024-06-05&end=2024-06-08");
    let (status, body) = call(&app, Method::GET, &uri, Some(&CY_GUEST), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available"], true);

    let uri = format!("/listings/{listing}/availability?start=2024-06-04&end=2024-06-06");
    let (_, body) = call(&app, Method::GET, &uri, Some(&CY_GUEST), None).await;
    assert_eq!(body["data"]["available"], false);

    let uri = format!("/listings/{listing}/calendar?start=2024-06-01&end=2024-06-10");
    let (status, body) = call(&app, Method::GET, &uri, Some(&CY_GUEST), None).await;
    assert_eq!(status, StatusCode::OK);
    let free = body["data"]["free"].as_array().unwrap();
    assert_eq!(free.len(), 2);
    assert_eq!(free[0]["end"], "2024-06-03");
    assert_eq!(free[1]["start"], "2024-06-05");
}

#[tokio::test]
async fn listing_deletion_rules() {
    let app = start_app();
    let listing = create_listing(&app).await;
    let (_, body) = book(&app, &BEN_GUEST, &listing, "2024-06-01", "2024-06-03").await;
    let booking = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, Method::DELETE, &format!("/listings/{listing}"), Some(&ANA_HOST), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, Method::DELETE, &format!("/bookings/{booking}"), Some(&ANA_HOST), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &format!("/bookings/{booking}"), Some(&ROOT), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::DELETE, &format!("/listings/{listing}"), Some(&ANA_HOST), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, &format!("/listings/{listing}"), Some(&ANA_HOST), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_route_is_enveloped() {
    let app = start_app();
    let (status, body) = call(&app, Method::GET, "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

// ── Reviews ──────────────────────────────────────────────────

async fn set_status(app: &Router, booking: &str, status: &str) {
    let (code, body) = call(
        app,
        Method::PATCH,
        &format!("/bookings/{booking}/status"),
        Some(&ANA_HOST),
        Some(json!({ "status": status })),
    )
    .await;
    assert_eq!(code, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn review_flow_over_http() {
    let app = start_app();
    let listing = create_listing(&app).await;
    let (_, body) = book(&app, &BEN_GUEST, &listing, "2024-06-01", "2024-06-05").await;
    let booking = body["data"]["id"].as_str().unwrap().to_string();
    let review_body = json!({ "bookingId": booking, "rating": 5, "comment": "Glorious sunsets" });

    // Not stayed yet.
    let (status, _) = call(&app, Method::POST, "/reviews", Some(&BEN_GUEST), Some(review_body.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    set_status(&app, &booking, "confirmed").await;
    set_status(&app, &booking, "completed").await;

    let (status, _) = call(&app, Method::POST, "/reviews", Some(&CY_GUEST), Some(review_body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = call(&app, Method::POST, "/reviews", Some(&BEN_GUEST), Some(review_body.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["rating"], 5);
    let review = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = call(&app, Method::POST, "/reviews", Some(&BEN_GUEST), Some(review_body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        Method::POST,
        "/reviews",
        Some(&BEN_GUEST),
        Some(json!({ "bookingId": booking, "rating": "five", "comment": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Guests cannot answer reviews; the listing's host can.
    let respond = json!({ "response": "Come back soon" });
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/reviews/{review}/respond"),
        Some(&CY_GUEST),
        Some(respond.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/reviews/{review}/respond"),
        Some(&ANA_HOST),
        Some(respond),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["hostResponse"], "Come back soon");

    let (status, body) = call(&app, Method::POST, &format!("/reviews/{review}/flag"), Some(&CY_GUEST), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["flagged"], true);

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/reviews/{review}"),
        Some(&BEN_GUEST),
        Some(json!({ "rating": 4, "comment": "Glorious, if chilly" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = call(&app, Method::GET, &format!("/reviews/listing/{listing}"), Some(&CY_GUEST), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["averageRating"], 4.0);
    assert_eq!(body["data"]["reviews"][0]["comment"], "Glorious, if chilly");

    let (status, body) = call(&app, Method::GET, "/reviews/my-reviews", Some(&BEN_GUEST), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, Method::DELETE, &format!("/reviews/{review}"), Some(&CY_GUEST), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &format!("/reviews/{review}"), Some(&ROOT), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, Method::GET, &format!("/reviews/listing/{listing}"), Some(&CY_GUEST), None).await;
    assert_eq!(body["data"]["count"], 0);
    assert_eq!(body["data"]["averageRating"], Value::Null);
}

#[tokio::test]
async fn notes_on_cancelled_booking_report_conflict() {
    let app = start_app();
    let listing = create_listing(&app).await;
    let (_, body) = book(&app, &BEN_GUEST, &listing, "2024-06-01", "2024-06-05").await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = call(&app, Method::PATCH, &format!("/bookings/{id}/cancel"), Some(&BEN_GUEST), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        Method::PATCH,
        &format!("/bookings/{id}/status"),
        Some(&ANA_HOST),
        Some(json!({ "status": "confirmed", "notes": "z".repeat(5000) })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}
