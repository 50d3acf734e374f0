use std::{io::Cursor, sync::Arc, time::Duration as StdDuration};

use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::{header, StatusCode},
    middleware::from_fn,
    test::{self, TestRequest},
    web, App,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use picshare_billing::webhook::sign_payload;
use picshare_domain::model::{NewAdmin, SubscriptionPatch, TenantUpdate};
use picshare_domain::services::{
    auth::TokenAuthority,
    credentials::hash_password,
    rate_limit::RateLimiter,
    telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard},
    testing::{FakeGateway, MemoryBlobStore, RecordingMailer},
};
use picshare_domain::storage::{AdminStore, BillingStore, SubscriptionStore, TenantStore};
use picshare_storage::SeaOrmStorage;

use crate::application::{configure_internal, configure_public};
use crate::media::JpegProcessor;
use crate::middleware::rate_limit;
use crate::state::{AppSettings, AppState, Collaborators};

const WEBHOOK_SECRET: &str = "whsec_test";
const BOUNDARY: &str = "picshare-test-boundary";

struct Harness {
    state: AppState,
    storage: SeaOrmStorage,
    gateway: Arc<FakeGateway>,
    blobs: Arc<MemoryBlobStore>,
    mailer: Arc<RecordingMailer>,
}

async fn storage() -> SeaOrmStorage {
    SeaOrmStorage::builder()
        .database_url("sqlite::memory:")
        .max_connections(1)
        .build()
        .await
        .expect("storage inits")
}

fn telemetry() -> TelemetryGuard {
    let config = TelemetryConfig::from_env("API_TEST");
    init_telemetry(&config).expect("telemetry inits")
}

async fn harness() -> Harness {
    harness_with_limit(10_000).await
}

async fn harness_with_limit(max_requests: u32) -> Harness {
    let storage = storage().await;
    let gateway = Arc::new(FakeGateway::default());
    let blobs = Arc::new(MemoryBlobStore::default());
    let mailer = Arc::new(RecordingMailer::default());
    let collaborators = Collaborators {
        gateway: gateway.clone(),
        blobs: blobs.clone(),
        mailer: mailer.clone(),
        media: Arc::new(JpegProcessor),
    };
    let settings = AppSettings {
        base_url: "http://localhost:3000".into(),
        expose_signup_credentials: true,
        upload_max_bytes: 5 * 1024 * 1024,
        webhook_secret: Some(WEBHOOK_SECRET.into()),
        local_upload_root: None,
    };
    let state = AppState::new(
        storage.clone(),
        collaborators,
        TokenAuthority::new("test-jwt-secret"),
        RateLimiter::in_memory(StdDuration::from_secs(60), max_requests),
        telemetry(),
        settings,
    );
    Harness {
        state,
        storage,
        gateway,
        blobs,
        mailer,
    }
}

macro_rules! public_app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($harness.state.clone()))
                .configure(|cfg| configure_public(cfg, true)),
        )
        .await
    };
}

async fn send<S, R, B>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn trial_request(slug: &str) -> TestRequest {
    TestRequest::post().uri("/signup/trial").set_json(json!({
        "shopName": format!("Event {slug}"),
        "shopSlug": slug,
        "ownerEmail": format!("{slug}@example.com"),
        "ownerPhone": "0800000000",
    }))
}

fn login_request(slug: &str, signup: &Value) -> TestRequest {
    TestRequest::post()
        .uri(&format!("/{slug}/admin/login"))
        .set_json(json!({
            "username": signup["credentials"]["username"],
            "password": signup["credentials"]["password"],
        }))
}

fn expect_ok((status, body): (StatusCode, Value), what: &str) -> Value {
    assert_eq!(status, StatusCode::OK, "{what} failed: {body}");
    body
}

macro_rules! signup_trial {
    ($app:expr, $slug:expr) => {
        expect_ok(send($app, trial_request($slug).to_request()).await, "trial signup")
    };
}

macro_rules! login {
    ($app:expr, $slug:expr, $signup:expr) => {
        expect_ok(
            send($app, login_request($slug, $signup).to_request()).await,
            "admin login",
        )["token"]
            .as_str()
            .expect("token issued")
            .to_string()
    };
}

macro_rules! upload_png {
    ($app:expr, $slug:expr) => {{
        let png = png_bytes();
        let req = upload_request($slug, &[("session_id", "guest-1")], Some(("image/png", png.as_slice())));
        expect_ok(send($app, req.to_request()).await, "upload")["data"].clone()
    }};
}

fn tenant_id(signup: &Value) -> Uuid {
    signup["tenant"]["id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("tenant id")
}

fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(32, 24, image::Rgb([200, 40, 90]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encodes");
    out.into_inner()
}

fn multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(slug: &str, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> TestRequest {
    TestRequest::post()
        .uri(&format!("/{slug}/upload"))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart(fields, file))
}

#[actix_web::test]
async fn trial_signup_runs_three_days_and_sends_welcome_email() {
    let h = harness().await;
    let app = public_app!(h);

    let before = Utc::now();
    let body = signup_trial!(&app, "test-event");

    assert_eq!(body["success"], true);
    assert_eq!(body["tenant"]["slug"], "test-event");
    assert_eq!(body["subscription"]["plan"], "trial");
    let period_end: DateTime<Utc> =
        serde_json::from_value(body["subscription"]["current_period_end"].clone())
            .expect("period end parses");
    let drift = (period_end - (before + Duration::days(3))).num_seconds().abs();
    assert!(drift <= 1, "trial period end drifted by {drift}s");
    assert!(h
        .mailer
        .sent_to()
        .contains(&"test-event@example.com".to_string()));
}

#[actix_web::test]
async fn duplicate_slug_is_rejected() {
    let h = harness().await;
    let app = public_app!(h);
    signup_trial!(&app, "taken-event");

    let req = TestRequest::post()
        .uri("/signup/trial")
        .set_json(json!({
            "shopName": "Another",
            "shopSlug": "taken-event",
            "ownerEmail": "other@example.com",
            "ownerPhone": "0822222222",
        }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn check_slug_reports_format_and_availability() {
    let h = harness().await;
    let app = public_app!(h);
    signup_trial!(&app, "booked-event");

    let cases = [
        ("ab", false, Some("too_short")),
        ("Bad_Slug", false, Some("invalid_format")),
        ("booked-event", false, None),
        ("fresh-event", true, None),
    ];
    for (slug, available, reason) in cases {
        let req = TestRequest::get()
            .uri(&format!("/check-slug/{slug}"))
            .to_request();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], available, "slug {slug}");
        if let Some(reason) = reason {
            assert_eq!(body["reason"], reason, "slug {slug}");
        }
    }
}

#[actix_web::test]
async fn plans_list_the_seeded_catalog() {
    let h = harness().await;
    let app = public_app!(h);

    let req = TestRequest::get().uri("/plans").to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = body["data"]
        .as_array()
        .expect("plans array")
        .iter()
        .filter_map(|plan| plan["key"].as_str())
        .collect();
    assert!(keys.contains(&"trial"));
    assert!(keys.contains(&"oneday"));
}

#[actix_web::test]
async fn free_plan_cannot_start_a_payment() {
    let h = harness().await;
    let app = public_app!(h);

    let req = TestRequest::post()
        .uri("/signup/create-payment")
        .set_json(json!({
            "planKey": "trial",
            "shopName": "Free Event",
            "shopSlug": "free-event",
            "ownerEmail": "owner@example.com",
        }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This plan does not require payment");
}

#[actix_web::test]
async fn paid_signup_completes_only_after_payment_succeeds() {
    let h = harness().await;
    let app = public_app!(h);

    let req = TestRequest::post()
        .uri("/signup/create-payment")
        .set_json(json!({
            "planKey": "oneday",
            "shopName": "Paid Event",
            "shopSlug": "paid-event",
            "ownerEmail": "paid@example.com",
            "ownerPhone": "0811111111",
        }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "create payment failed: {body}");
    assert_eq!(body["amount"], 19_900);
    let intent_id = body["paymentIntentId"]
        .as_str()
        .expect("intent id")
        .to_string();

    let complete = || {
        TestRequest::post()
            .uri("/signup/complete")
            .set_json(json!({ "paymentIntentId": intent_id, "shopSlug": "paid-event" }))
            .to_request()
    };
    let (status, body) = send(&app, complete()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Payment not completed");

    h.gateway.set_status(&intent_id, "succeeded");
    let (status, body) = send(&app, complete()).await;
    assert_eq!(status, StatusCode::OK, "complete failed: {body}");
    assert_eq!(body["tenant"]["slug"], "paid-event");
    assert_eq!(body["subscription"]["plan"], "oneday");

    let records = h
        .storage
        .list_billing_records(tenant_id(&body))
        .await
        .expect("billing history");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].amount, 19_900);
}

#[actix_web::test]
async fn free_tenant_upload_is_stored_pending() {
    let h = harness().await;
    let app = public_app!(h);
    signup_trial!(&app, "upload-event");

    let image = upload_png!(&app, "upload-event");
    assert_eq!(image["status"], "pending");
    assert_eq!(image["mime_type"], "image/jpeg");
    assert_eq!(image["width"], 32);
    assert_eq!(image["height"], 24);
    assert_eq!(h.blobs.paths().len(), 2);

    // pending images stay out of the public gallery
    let req = TestRequest::get().uri("/upload-event/gallery").to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);
}

#[actix_web::test]
async fn payment_enabled_tenant_rejects_null_intent() {
    let h = harness().await;
    let app = public_app!(h);
    let signup = signup_trial!(&app, "paid-uploads");
    h.storage
        .update_tenant(
            tenant_id(&signup),
            TenantUpdate {
                payment_enabled: Some(true),
                price_amount: Some(2_000),
                ..Default::default()
            },
        )
        .await
        .expect("tenant updated");

    let png = png_bytes();
    let req = upload_request(
        "paid-uploads",
        &[("paymentIntentId", "null")],
        Some(("image/png", png.as_slice())),
    )
    .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Payment is required for this tenant");
    assert!(h.blobs.paths().is_empty());
}

#[actix_web::test]
async fn upload_without_file_or_with_wrong_type_is_rejected() {
    let h = harness().await;
    let app = public_app!(h);
    signup_trial!(&app, "strict-event");

    let req = upload_request("strict-event", &[("caption", "hi")], None).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");

    let req = upload_request("strict-event", &[], Some(("text/plain", &b"not an image"[..])))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.blobs.paths().is_empty());
}

#[actix_web::test]
async fn expired_subscription_blocks_upload_and_deactivates_tenant() {
    let h = harness().await;
    let app = public_app!(h);
    let signup = signup_trial!(&app, "lapsed-event");
    let tenant = tenant_id(&signup);

    let active = h
        .storage
        .find_active_subscription(tenant)
        .await
        .expect("lookup")
        .expect("trial is active");
    h.storage
        .update_subscription(
            active.subscription.id,
            SubscriptionPatch {
                current_period_end: Some(Utc::now() - Duration::hours(1)),
                ..Default::default()
            },
        )
        .await
        .expect("period moved");

    let png = png_bytes();
    let req = upload_request("lapsed-event", &[], Some(("image/png", png.as_slice()))).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["expired_at"].is_string(), "missing expired_at: {body}");

    let stored = h
        .storage
        .find_tenant(tenant)
        .await
        .expect("lookup")
        .expect("tenant exists");
    assert!(!stored.is_active);
    assert!(h
        .storage
        .find_active_subscription(tenant)
        .await
        .expect("lookup")
        .is_none());

    // the public gallery now treats the tenant as gone
    let req = TestRequest::get().uri("/lapsed-event/info").to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn moderation_is_single_shot() {
    let h = harness().await;
    let app = public_app!(h);
    let signup = signup_trial!(&app, "mod-event");
    let token = login!(&app, "mod-event", &signup);
    let image = upload_png!(&app, "mod-event");
    let image_id = image["id"].as_str().expect("image id").to_string();

    let approve = || {
        TestRequest::put()
            .uri(&format!("/mod-event/admin/images/{image_id}/approve"))
            .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
            .to_request()
    };
    let (status, body) = send(&app, approve()).await;
    assert_eq!(status, StatusCode::OK, "approve failed: {body}");
    assert_eq!(body["data"]["status"], "approved");

    let (status, body) = send(&app, approve()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Image already processed");

    let req = TestRequest::put()
        .uri(&format!("/mod-event/admin/images/{image_id}/reject"))
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .set_json(json!({ "reason": "too late" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = TestRequest::get().uri("/mod-event/gallery").to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[actix_web::test]
async fn admin_routes_require_a_token_for_the_same_tenant() {
    let h = harness().await;
    let app = public_app!(h);
    let first = signup_trial!(&app, "first-event");
    signup_trial!(&app, "second-event");
    let token = login!(&app, "first-event", &first);

    let req = TestRequest::get().uri("/first-event/admin/stats").to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = TestRequest::get()
        .uri("/second-event/admin/stats")
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Access denied to this tenant");

    let req = TestRequest::get()
        .uri("/first-event/admin/quota")
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["allowed"], true);
    assert_eq!(body["data"]["usage"]["limit"], 50);
}

#[actix_web::test]
async fn wrong_password_is_unauthorized() {
    let h = harness().await;
    let app = public_app!(h);
    let signup = signup_trial!(&app, "locked-event");

    let req = TestRequest::post()
        .uri("/locked-event/admin/login")
        .set_json(json!({
            "username": signup["credentials"]["username"],
            "password": "definitely-wrong",
        }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[actix_web::test]
async fn settings_update_validates_ranges() {
    let h = harness().await;
    let app = public_app!(h);
    let signup = signup_trial!(&app, "settings-event");
    let token = login!(&app, "settings-event", &signup);

    let put = |payload: Value| {
        TestRequest::put()
            .uri("/settings-event/admin/settings")
            .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
            .set_json(payload)
            .to_request()
    };
    let (status, _) = send(&app, put(json!({ "image_expiry_hours": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, put(json!({ "name": "Renamed Event" }))).await;
    assert_eq!(status, StatusCode::OK, "settings failed: {body}");
    assert_eq!(body["data"]["name"], "Renamed Event");
}

#[actix_web::test]
async fn like_toggles_per_session() {
    let h = harness().await;
    let app = public_app!(h);
    let signup = signup_trial!(&app, "like-event");
    let token = login!(&app, "like-event", &signup);
    let image = upload_png!(&app, "like-event");
    let image_id = image["id"].as_str().expect("image id").to_string();

    let req = TestRequest::put()
        .uri(&format!("/like-event/admin/images/{image_id}/approve"))
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let like = || {
        TestRequest::post()
            .uri(&format!("/like-event/images/{image_id}/like"))
            .set_json(json!({ "session_id": "guest-42" }))
            .to_request()
    };
    let (status, body) = send(&app, like()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["liked"], true);
    assert_eq!(body["data"]["like_count"], 1);

    let req = TestRequest::get()
        .uri("/like-event/gallery?session_id=guest-42")
        .to_request();
    let (_, body) = send(&app, req).await;
    assert_eq!(body["data"]["images"][0]["has_liked"], true);

    let (status, body) = send(&app, like()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["liked"], false);
    assert_eq!(body["data"]["like_count"], 0);
}

#[actix_web::test]
async fn comments_are_trimmed_and_listed() {
    let h = harness().await;
    let app = public_app!(h);
    let signup = signup_trial!(&app, "chat-event");
    let token = login!(&app, "chat-event", &signup);
    let image = upload_png!(&app, "chat-event");
    let image_id = image["id"].as_str().expect("image id").to_string();
    let req = TestRequest::put()
        .uri(&format!("/chat-event/admin/images/{image_id}/approve"))
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .to_request();
    send(&app, req).await;

    let comment = |content: &str| {
        TestRequest::post()
            .uri(&format!("/chat-event/images/{image_id}/comments"))
            .set_json(json!({ "content": content, "session_id": "guest-7" }))
            .to_request()
    };
    let (status, _) = send(&app, comment("   ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, comment("  lovely  ")).await;
    assert_eq!(status, StatusCode::OK, "comment failed: {body}");
    assert_eq!(body["data"]["content"], "lovely");

    let req = TestRequest::get()
        .uri(&format!("/chat-event/images/{image_id}/comments"))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[actix_web::test]
async fn webhook_rejects_bad_signature_and_applies_signed_events() {
    let h = harness().await;
    let app = public_app!(h);

    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": "pi_unknown",
            "status": "succeeded",
            "amount": 2000,
            "currency": "thb",
        }},
    })
    .to_string();

    let req = TestRequest::post()
        .uri("/webhook/stripe")
        .insert_header(("Stripe-Signature", "t=1,v1=deadbeef"))
        .set_payload(payload.clone())
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let signature = sign_payload(payload.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());
    let req = TestRequest::post()
        .uri("/webhook/stripe")
        .insert_header(("Stripe-Signature", signature))
        .set_payload(payload)
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "webhook failed: {body}");
    assert_eq!(body["received"], true);
    assert_eq!(body["outcome"], "no_match");
}

#[actix_web::test]
async fn rate_limiter_returns_retry_after() {
    let h = harness_with_limit(2).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .wrap(from_fn(rate_limit))
            .configure(|cfg| configure_public(cfg, true)),
    )
    .await;

    for _ in 0..2 {
        let req = TestRequest::get()
            .uri("/plans")
            .peer_addr("10.0.0.9:4000".parse().expect("addr"))
            .to_request();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    let req = TestRequest::get()
        .uri("/plans")
        .peer_addr("10.0.0.9:4000".parse().expect("addr"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("Retry-After"));
}

#[actix_web::test]
async fn super_admin_manages_tenants_and_admins() {
    let h = harness().await;
    let app = public_app!(h);
    h.storage
        .insert_admin(NewAdmin::super_admin(
            "root",
            hash_password("supersecret").expect("hash"),
        ))
        .await
        .expect("super admin seeded");

    let req = TestRequest::post()
        .uri("/super-admin/login")
        .set_json(json!({ "username": "root", "password": "supersecret" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "super login failed: {body}");
    let token = body["token"].as_str().expect("token").to_string();
    let bearer = format!("Bearer {token}");

    let req = TestRequest::post()
        .uri("/super-admin/tenants")
        .insert_header((header::AUTHORIZATION, bearer.clone()))
        .set_json(json!({ "slug": "managed-event", "name": "Managed" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "create tenant failed: {body}");
    let managed: Uuid = body["data"]["id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("tenant id");

    let create_admin = |password: &str| {
        TestRequest::post()
            .uri("/super-admin/admins")
            .insert_header((header::AUTHORIZATION, bearer.clone()))
            .set_json(json!({
                "username": "managed-owner",
                "password": password,
                "tenant_id": managed,
            }))
            .to_request()
    };
    let (status, _) = send(&app, create_admin("short")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = send(&app, create_admin("long-enough-pw")).await;
    assert_eq!(status, StatusCode::CREATED, "create admin failed: {body}");
    let (status, body) = send(&app, create_admin("long-enough-pw")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username already taken");

    let req = TestRequest::get()
        .uri("/super-admin/tenants")
        .insert_header((header::AUTHORIZATION, bearer.clone()))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let req = TestRequest::delete()
        .uri(&format!("/super-admin/tenants/{managed}"))
        .insert_header((header::AUTHORIZATION, bearer))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h
        .storage
        .find_tenant(managed)
        .await
        .expect("lookup")
        .is_none());
}

#[actix_web::test]
async fn tenant_admin_cannot_reach_super_admin_routes() {
    let h = harness().await;
    let app = public_app!(h);
    let signup = signup_trial!(&app, "plain-event");
    let token = login!(&app, "plain-event", &signup);

    let req = TestRequest::get()
        .uri("/super-admin/tenants")
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn super_admin_lists_removes_admins_and_reads_stats() {
    let h = harness().await;
    let app = public_app!(h);
    let root = h
        .storage
        .insert_admin(NewAdmin::super_admin(
            "root",
            hash_password("supersecret").expect("hash"),
        ))
        .await
        .expect("super admin seeded");
    let signup = signup_trial!(&app, "stats-event");
    upload_png!(&app, "stats-event");

    let req = TestRequest::post()
        .uri("/super-admin/login")
        .set_json(json!({ "username": "root", "password": "supersecret" }))
        .to_request();
    let body = expect_ok(send(&app, req).await, "super login");
    let bearer = format!("Bearer {}", body["token"].as_str().expect("token"));

    let req = TestRequest::get()
        .uri("/super-admin/admins")
        .insert_header((header::AUTHORIZATION, bearer.clone()))
        .to_request();
    let body = expect_ok(send(&app, req).await, "list admins");
    let admins = body["data"].as_array().expect("admin list");
    assert_eq!(admins.len(), 2);
    let owner = admins
        .iter()
        .find(|admin| admin["is_super_admin"] == false)
        .expect("tenant admin listed");
    assert_eq!(owner["tenant"]["slug"], "stats-event");
    assert!(owner.get("password_hash").is_none());
    let owner_id = owner["id"].as_str().expect("owner id").to_string();

    let req = TestRequest::get()
        .uri("/super-admin/stats")
        .insert_header((header::AUTHORIZATION, bearer.clone()))
        .to_request();
    let body = expect_ok(send(&app, req).await, "stats");
    assert_eq!(body["data"]["overview"]["total_tenants"], 1);
    assert_eq!(body["data"]["overview"]["pending_images"], 1);
    assert_eq!(body["data"]["tenants"][0]["slug"], "stats-event");

    let delete = |id: String| {
        TestRequest::delete()
            .uri(&format!("/super-admin/admins/{id}"))
            .insert_header((header::AUTHORIZATION, bearer.clone()))
            .to_request()
    };
    let (status, body) = send(&app, delete(root.id.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot delete yourself");

    expect_ok(send(&app, delete(owner_id.clone())).await, "delete admin");
    let (status, _) = send(&app, delete(owner_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, login_request("stats-event", &signup).to_request()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn theme_is_public_and_gallery_hides_storage_details() {
    let h = harness().await;
    let app = public_app!(h);
    let signup = signup_trial!(&app, "brand-event");
    let token = login!(&app, "brand-event", &signup);

    let req = TestRequest::put()
        .uri("/brand-event/admin/settings")
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .set_json(json!({ "theme_settings": { "primary": "#ff0066" } }))
        .to_request();
    expect_ok(send(&app, req).await, "settings");

    let req = TestRequest::get().uri("/brand-event/theme").to_request();
    let body = expect_ok(send(&app, req).await, "theme");
    assert_eq!(body["data"]["slug"], "brand-event");
    assert_eq!(body["data"]["theme"]["primary"], "#ff0066");

    let req = TestRequest::get().uri("/missing-event/theme").to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let image = upload_png!(&app, "brand-event");
    let image_id = image["id"].as_str().expect("image id").to_string();
    let req = TestRequest::put()
        .uri(&format!("/brand-event/admin/images/{image_id}/approve"))
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .to_request();
    expect_ok(send(&app, req).await, "approve");

    let req = TestRequest::get().uri("/brand-event/gallery").to_request();
    let body = expect_ok(send(&app, req).await, "gallery");
    let listed = &body["data"]["images"][0];
    assert_eq!(listed["id"], image_id.as_str());
    assert!(listed["thumbnail_url"].is_string());
    assert!(listed.get("session_id").is_none());
    assert!(listed.get("file_path").is_none());
    assert!(listed.get("thumbnail_path").is_none());
}

#[actix_web::test]
async fn internal_sweep_expires_lapsed_subscriptions() {
    let h = harness().await;
    let public = public_app!(h);
    let signup = signup_trial!(&public, "sweep-event");
    let tenant = tenant_id(&signup);
    let active = h
        .storage
        .find_active_subscription(tenant)
        .await
        .expect("lookup")
        .expect("trial is active");
    h.storage
        .update_subscription(
            active.subscription.id,
            SubscriptionPatch {
                current_period_end: Some(Utc::now() - Duration::minutes(5)),
                ..Default::default()
            },
        )
        .await
        .expect("period moved");

    let internal = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(configure_internal),
    )
    .await;
    let req = TestRequest::post()
        .uri("/internal/subscriptions/sweep")
        .to_request();
    let (status, body) = send(&internal, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 1);

    let req = TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&internal, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
