use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Json, RequestPartsExt, Router,
    extract::{
        ConnectInfo, FromRequestParts, Path, Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{self, HeaderName, HeaderValue, Method, StatusCode, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use platform_api::{ApiError, ApiResult};
use platform_authn::{AuthConfig, CurrentUser, UserRole, authenticate};
use products_enrollment::{
    Enrollment,
    batches::NewBatch,
    conversion::PayAndConvertRequest,
    invoices::NewInvoice,
    leads::{LeadPatch, NewLead},
    payments::TuitionPayment,
    views::{BatchView, InvoiceView, LeadView, PaymentView, StudentView},
};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::{config::AppConfig, graphql::SchemaType};

pub type ClientLimiter = DefaultKeyedRateLimiter<String>;

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub enrollment: Arc<Enrollment>,
    pub schema: SchemaType,
    pub auth: Arc<AuthConfig>,
    pub limiter: Arc<ClientLimiter>,
    pub cors_allowed_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(enrollment: Enrollment, config: &AppConfig) -> Self {
        let enrollment = Arc::new(enrollment);
        let per_minute = NonZeroU32::new(config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            schema: crate::graphql::build_schema(enrollment.clone()),
            enrollment,
            auth: Arc::new(config.auth.clone()),
            limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            cors_allowed_origins: Arc::new(config.cors_allowed_origins.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    let pruning = spawn_limiter_pruning(state.limiter.clone(), LIMITER_PRUNE_INTERVAL);
    let router = build_router(state);

    info!(%config.addr, "school server listening");
    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error");
    pruning.abort();
    served
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    let writes = Router::new()
        .route("/invoices/{id}/pay-and-convert", post(pay_and_convert_handler))
        .route("/invoices/{id}/cancel", post(cancel_invoice_handler))
        .route("/leads", post(create_lead_handler))
        .route("/leads/{id}", patch(update_lead_handler))
        .route("/leads/{id}/invoices", post(create_invoice_handler))
        .route("/batches", post(create_batch_handler))
        .route("/students/{id}/payments", post(record_payment_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health_handler))
        .route("/graphql", post(graphql_handler))
        .merge(writes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.cors_allowed_origins)),
        )
        .with_state(state)
}

/// Caller resolved from the bearer token.
pub struct Authenticated(pub CurrentUser);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ApiError::Unauthorized)?;
        let user = authenticate(bearer.token(), &state.auth).map_err(|err| {
            tracing::debug!(error = %err, "bearer token rejected");
            ApiError::Unauthorized
        })?;
        Ok(Self(user))
    }
}

fn require(user: &CurrentUser, role: UserRole) -> ApiResult<()> {
    if user.has_role(role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Bucket requests by the verified token subject. Anything without a valid
/// token shares the bucket of its peer address, so header values the client
/// invents never open a new bucket.
fn client_key(request: &Request, auth: &AuthConfig) -> String {
    let verified = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| authenticate(token.trim(), auth).ok());
    if let Some(user) = verified {
        return format!("user:{}", user.user_id);
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("peer:{}", addr.ip()))
        .unwrap_or_else(|| "peer:unknown".to_string())
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request, &state.auth);
    if state.limiter.check_key(&key).is_err() {
        tracing::warn!(path = %request.uri().path(), "rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }
    next.run(request).await
}

/// Drop limiter entries that have refilled so the key map stays bounded.
pub fn spawn_limiter_pruning(limiter: Arc<ClientLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            limiter.retain_recent();
            limiter.shrink_to_fit();
            tracing::debug!(keys = limiter.len(), "rate limiter pruned");
        }
    })
}

async fn pay_and_convert_handler(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<PayAndConvertRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    require(&user, UserRole::Staff)?;
    let Path(invoice_id) = path?;
    let Json(request) = body?;
    let outcome = state
        .enrollment
        .pay_and_convert(invoice_id, request, Some(user.user_id))
        .await?;
    Ok(Json(outcome.body))
}

async fn create_lead_handler(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    body: Result<Json<NewLead>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LeadView>)> {
    require(&user, UserRole::Staff)?;
    let Json(input) = body?;
    let lead = state
        .enrollment
        .create_lead(input, Some(user.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(lead.into())))
}

async fn update_lead_handler(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<LeadPatch>, JsonRejection>,
) -> ApiResult<Json<LeadView>> {
    require(&user, UserRole::Staff)?;
    let Path(lead_id) = path?;
    let Json(patch) = body?;
    let lead = state
        .enrollment
        .update_lead(lead_id, patch, Some(user.user_id))
        .await?;
    Ok(Json(lead.into()))
}

async fn create_invoice_handler(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<NewInvoice>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InvoiceView>)> {
    require(&user, UserRole::Staff)?;
    let Path(lead_id) = path?;
    let Json(input) = body?;
    let invoice = state
        .enrollment
        .create_invoice(lead_id, input, Some(user.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(invoice.into())))
}

async fn cancel_invoice_handler(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<InvoiceView>> {
    require(&user, UserRole::Admin)?;
    let Path(invoice_id) = path?;
    let invoice = state
        .enrollment
        .cancel_invoice(invoice_id, Some(user.user_id))
        .await?;
    Ok(Json(invoice.into()))
}

async fn create_batch_handler(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    body: Result<Json<NewBatch>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BatchView>)> {
    require(&user, UserRole::Admin)?;
    let Json(input) = body?;
    let batch = state
        .enrollment
        .create_batch(input, Some(user.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(batch.into())))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRecorded {
    payment: PaymentView,
    student: StudentView,
}

async fn record_payment_handler(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<TuitionPayment>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PaymentRecorded>)> {
    require(&user, UserRole::Staff)?;
    let Path(student_id) = path?;
    let Json(input) = body?;
    let receipt = state
        .enrollment
        .record_payment(student_id, input, Some(user.user_id))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PaymentRecorded {
            payment: receipt.payment.into(),
            student: receipt.student.into(),
        }),
    ))
}

async fn graphql_handler(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    request: GraphQLRequest,
) -> ApiResult<GraphQLResponse> {
    require(&user, UserRole::Viewer)?;
    let response = state.schema.execute(request.into_inner().data(user)).await;
    Ok(GraphQLResponse::from(response))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = platform_db::ping(state.enrollment.db()).await;
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            ok: db_ok,
            db_ok,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}
