use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use migration::{Migrator, MigratorTrait};
use platform_authn::{UserRole, issue_token};
use platform_db::DatabaseSettings;
use products_enrollment::{Enrollment, invoices::NewInvoice, leads::NewLead};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use server::{
    build_enrollment,
    config::AppConfig,
    http::{AppState, build_router},
};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTIzNDU2Nzg5MDE=";

struct Harness {
    router: Router,
    enrollment: Arc<Enrollment>,
    config: AppConfig,
}

impl Harness {
    async fn new() -> Self {
        Self::with_rate_limit(1000).await
    }

    async fn with_rate_limit(per_minute: u32) -> Self {
        let config = AppConfig::from_lookup(|key| match key {
            "AUTH_SECRET_BASE64" => Some(SECRET.into()),
            "RATE_LIMIT_PER_MINUTE" => Some(per_minute.to_string()),
            _ => None,
        })
        .unwrap();
        let settings = DatabaseSettings::new("sqlite::memory:").with_max_connections(1);
        let db = platform_db::connect(&settings).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let state = AppState::new(build_enrollment(Arc::new(db), &config), &config);
        Self {
            enrollment: state.enrollment.clone(),
            router: build_router(state),
            config,
        }
    }

    fn token(&self, role: UserRole) -> String {
        issue_token(Uuid::new_v4(), &[role], &self.config.auth).unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(json_request("POST", path, token, body.to_string())).await
    }

    async fn invoice(&self, name: &str, total: &str) -> Uuid {
        let lead = self
            .enrollment
            .create_lead(
                NewLead {
                    name: name.into(),
                    email: Some(format!("{}@example.com", name.to_lowercase())),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        self.enrollment
            .create_invoice(
                lead.id,
                NewInvoice {
                    total_amount: total.parse::<Decimal>().unwrap(),
                    currency: Some("EUR".into()),
                },
                None,
            )
            .await
            .unwrap()
            .id
    }
}

fn json_request(method: &str, path: &str, token: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn pay(amount: &str, key: &str) -> Value {
    json!({ "paidAmount": amount, "idempotencyKey": key })
}

#[tokio::test]
async fn health_reports_database() {
    let harness = Harness::new().await;
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["dbOk"], true);
}

#[tokio::test]
async fn writes_require_a_staff_token() {
    let harness = Harness::new().await;
    let invoice = harness.invoice("Ada", "500.00").await;
    let path = format!("/invoices/{invoice}/pay-and-convert");

    let (status, body) = harness.post(&path, None, pay("500.00", "k1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = harness
        .post(&path, Some("not-a-token"), pay("500.00", "k1"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let viewer = harness.token(UserRole::Viewer);
    let (status, body) = harness.post(&path, Some(&viewer), pay("500.00", "k1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let staff = harness.token(UserRole::Staff);
    let (status, _) = harness
        .post("/batches", Some(&staff), json!({ "name": "A1", "totalSeats": 10 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn pay_and_convert_enrolls_and_replays() {
    let harness = Harness::new().await;
    let invoice = harness.invoice("Grace", "500.00").await;
    let path = format!("/invoices/{invoice}/pay-and-convert");
    let staff = harness.token(UserRole::Staff);

    let (status, first) = harness.post(&path, Some(&staff), pay("500.00", "abc")).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["success"], true);
    assert_eq!(first["invoiceStatus"], "PAID");
    assert_eq!(first["student"]["balance"], "0.00");
    assert_eq!(first["student"]["paymentStatus"], "PAID");
    assert!(first["studentId"].as_str().unwrap().starts_with("STU-"));

    let (status, again) = harness.post(&path, Some(&staff), pay("500.00", "abc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, first);

    let (status, body) = harness.post(&path, Some(&staff), pay("500.00", "other")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn overpayment_reports_the_excess() {
    let harness = Harness::new().await;
    let invoice = harness.invoice("Linus", "500.00").await;
    let staff = harness.token(UserRole::Staff);

    let (status, body) = harness
        .post(
            &format!("/invoices/{invoice}/pay-and-convert"),
            Some(&staff),
            pay("600.00", "over"),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["excess"], "100.00");
}

#[tokio::test]
async fn malformed_input_is_a_bad_request() {
    let harness = Harness::new().await;
    let staff = harness.token(UserRole::Staff);

    let (status, _) = harness
        .post("/invoices/not-a-uuid/pay-and-convert", Some(&staff), pay("1.00", "k"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let invoice = harness.invoice("Barbara", "100.00").await;
    let request = json_request(
        "POST",
        &format!("/invoices/{invoice}/pay-and-convert"),
        Some(&staff),
        "{\"paidAmount\":".into(),
    );
    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    let (status, _) = harness
        .post(
            &format!("/invoices/{invoice}/pay-and-convert"),
            Some(&staff),
            pay("100.00", ""),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lead_and_invoice_routes_create_records() {
    let harness = Harness::new().await;
    let staff = harness.token(UserRole::Staff);

    let (status, lead) = harness
        .post("/leads", Some(&staff), json!({ "name": "Edsger", "source": "REFERRAL" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{lead}");
    assert_eq!(lead["status"], "NEW");
    let lead_id = lead["id"].as_str().unwrap().to_string();

    let (status, invoice) = harness
        .post(
            &format!("/leads/{lead_id}/invoices"),
            Some(&staff),
            json!({ "totalAmount": "250.00" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    assert_eq!(invoice["status"], "PENDING");
    assert_eq!(invoice["totalAmount"], "250.00");

    let request = json_request(
        "PATCH",
        &format!("/leads/{lead_id}"),
        Some(&staff),
        json!({ "status": "CONTACTED" }).to_string(),
    );
    let (status, patched) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK, "{patched}");
    assert_eq!(patched["status"], "CONTACTED");
}

#[tokio::test]
async fn write_routes_are_rate_limited() {
    let harness = Harness::with_rate_limit(1).await;
    let staff = harness.token(UserRole::Staff);

    let (status, _) = harness
        .post("/leads", Some(&staff), json!({ "name": "First" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = harness
        .post("/leads", Some(&staff), json!({ "name": "Second" }))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rotating_made_up_tokens_share_one_bucket() {
    let harness = Harness::with_rate_limit(1).await;

    let (status, _) = harness
        .post("/leads", Some("made-up-1"), json!({ "name": "First" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = harness
        .post("/leads", Some("made-up-2"), json!({ "name": "Second" }))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");

    let mut forwarded = json_request(
        "POST",
        "/leads",
        Some("made-up-3"),
        json!({ "name": "Third" }).to_string(),
    );
    forwarded
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
    let (status, _) = harness.send(forwarded).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let staff = harness.token(UserRole::Staff);
    let (status, _) = harness
        .post("/leads", Some(&staff), json!({ "name": "Signed" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn graphql_reads_for_viewers() {
    let harness = Harness::new().await;
    harness.invoice("Margaret", "300.00").await;
    let viewer = harness.token(UserRole::Viewer);

    let (status, body) = harness
        .post(
            "/graphql",
            Some(&viewer),
            json!({ "query": "{ leads { name status } outstanding { baseCurrency totalOutstanding } }" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["leads"][0]["name"], "Margaret");
    assert_eq!(body["data"]["outstanding"]["baseCurrency"], "EUR");
    assert_eq!(body["data"]["outstanding"]["totalOutstanding"], "0.00");

    let (status, body) = harness
        .post("/graphql", Some(&viewer), json!({ "query": "{ auditLog { action } }" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["errors"][0]["extensions"]["code"], "FORBIDDEN");

    let (status, _) = harness
        .post("/graphql", None, json!({ "query": "{ version }" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
