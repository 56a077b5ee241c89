#![doc = include_str!("../README.md")]

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware as axum_mw,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use edustore::routes::{admin, auth, downloads, ok, orders};
use edustore::{session, AppContext, Claims, ServiceError};
use edustore_core::db::adapter::Adapter;
use edustore_core::db::models::{Permissions, PermissionsPatch};
use edustore_core::{EduStoreOptions, ErrorCode};

// ─── Error Handling ──────────────────────────────────────────────

/// A domain failure on its way out as an HTTP response.
///
/// The body is the core envelope `{ "error", "code" }`; rate-limited
/// responses also carry `retryAfter` and a `Retry-After` header.
#[derive(Debug)]
pub struct HttpError(pub ServiceError);

impl From<ServiceError> for HttpError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let api = self.0.to_api_error();
        let status = StatusCode::from_u16(api.status.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(api.to_json())).into_response();
        if let Some(retry_after) = api.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

type HttpResult<T> = Result<T, HttpError>;

/// Malformed JSON bodies and query strings are validation errors, not
/// axum's plain-text rejections.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> HttpResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ServiceError::validation(rejection.body_text()).into())
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> HttpResult<T> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ServiceError::validation(rejection.body_text()).into())
}

// ─── Bearer Authentication ──────────────────────────────────────

/// Verified claims from the `Authorization: Bearer <token>` header.
///
/// Extraction fails with 401 when the header is missing or the token does
/// not verify. Role checks happen in the handlers against the stored user.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

impl FromRequestParts<Arc<AppContext>> for Authenticated {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ServiceError::Unauthorized)?;
        let claims = session::authenticate(ctx, token)?;
        Ok(Self(claims))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

// ─── Router ─────────────────────────────────────────────────────

/// The EduStore HTTP surface.
///
/// ```rust,ignore
/// let store = EduStore::new(options, Arc::new(adapter));
/// let app = store.router_with_cors();
/// axum::serve(listener, app).await?;
/// ```
pub struct EduStore {
    ctx: Arc<AppContext>,
}

impl EduStore {
    pub fn new(options: EduStoreOptions, adapter: Arc<dyn Adapter>) -> Self {
        Self {
            ctx: Arc::new(AppContext::new(options, adapter)),
        }
    }

    /// Wrap an already configured context (custom notifier, store or limiter).
    pub fn from_context(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// All routes nested under the configured base path, with request tracing.
    pub fn router(&self) -> Router {
        let base_path = self.ctx.options.base_path.trim_end_matches('/');
        let router = if base_path.is_empty() {
            Router::new().merge(self.api_routes())
        } else {
            Router::new().nest(base_path, self.api_routes())
        };
        router
            .fallback(handle_not_found)
            .layer(TraceLayer::new_for_http())
    }

    /// `router()` with a permissive CORS layer for browser clients.
    pub fn router_with_cors(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        self.router().layer(cors)
    }

    fn api_routes(&self) -> Router {
        Router::new()
            .route("/ok", get(handle_ok))
            // Auth
            .route("/auth/request-otp", post(handle_request_otp))
            .route("/auth/verify-otp", post(handle_verify_otp))
            .route("/auth/refresh-token", post(handle_refresh_token))
            .route("/auth/me", get(handle_me))
            // Orders
            .route("/orders", post(handle_create_order))
            .route("/orders/my-orders", get(handle_list_my_orders))
            .route("/orders/stats/overview", get(handle_stats))
            .route("/orders/download/{download_id}", post(handle_redeem))
            .route("/orders/{order_id}", get(handle_get_order))
            .route("/orders/{order_id}/status", patch(handle_update_status))
            // Admin management
            .route("/admin/create-admin", post(handle_create_admin))
            .route("/admin/admins", get(handle_list_admins))
            .route(
                "/admin/admins/{admin_id}/permissions",
                put(handle_update_permissions),
            )
            .route("/admin/admins/{admin_id}", delete(handle_delete_admin))
            .route("/admin/permissions", get(handle_my_permissions))
            .fallback(handle_not_found)
            .layer(axum_mw::from_fn_with_state(
                self.ctx.clone(),
                rate_limit_middleware,
            ))
            .with_state(self.ctx.clone())
    }
}

// ─── Route Handlers ─────────────────────────────────────────────

async fn handle_ok() -> impl IntoResponse {
    Json(ok::handle_ok())
}

async fn handle_not_found() -> HttpError {
    ServiceError::NotFound(ErrorCode::NotFound).into()
}

async fn handle_request_otp(
    State(ctx): State<Arc<AppContext>>,
    body: Result<Json<auth::RequestOtpRequest>, JsonRejection>,
) -> HttpResult<Json<auth::RequestOtpResponse>> {
    let res = auth::handle_request_otp(ctx, json_body(body)?).await?;
    Ok(Json(res))
}

async fn handle_verify_otp(
    State(ctx): State<Arc<AppContext>>,
    body: Result<Json<auth::VerifyOtpRequest>, JsonRejection>,
) -> HttpResult<Json<auth::VerifyOtpResponse>> {
    let res = auth::handle_verify_otp(ctx, json_body(body)?).await?;
    Ok(Json(res))
}

async fn handle_refresh_token(
    State(ctx): State<Arc<AppContext>>,
    body: Result<Json<auth::RefreshTokenRequest>, JsonRejection>,
) -> HttpResult<Json<auth::TokenResponse>> {
    let res = auth::handle_refresh_token(ctx, json_body(body)?).await?;
    Ok(Json(res))
}

async fn handle_me(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
) -> HttpResult<Json<auth::MeResponse>> {
    Ok(Json(auth::handle_me(ctx, claims).await?))
}

async fn handle_create_order(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
    body: Result<Json<orders::CreateOrderRequest>, JsonRejection>,
) -> HttpResult<(StatusCode, Json<orders::CreateOrderResponse>)> {
    let res = orders::handle_create_order(ctx, claims, json_body(body)?).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

async fn handle_list_my_orders(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
    query: Result<Query<orders::ListOrdersQuery>, QueryRejection>,
) -> HttpResult<Json<orders::ListOrdersResponse>> {
    let res = orders::handle_list_my_orders(ctx, claims, query_params(query)?).await?;
    Ok(Json(res))
}

async fn handle_get_order(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
    Path(order_id): Path<String>,
) -> HttpResult<Json<orders::OrderResponse>> {
    Ok(Json(orders::handle_get_order(ctx, claims, &order_id).await?))
}

async fn handle_update_status(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
    Path(order_id): Path<String>,
    body: Result<Json<orders::UpdateStatusRequest>, JsonRejection>,
) -> HttpResult<Json<orders::UpdateStatusResponse>> {
    let res = orders::handle_update_status(ctx, claims, &order_id, json_body(body)?).await?;
    Ok(Json(res))
}

async fn handle_stats(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
) -> HttpResult<Json<orders::StatsResponse>> {
    Ok(Json(orders::handle_stats(ctx, claims).await?))
}

async fn handle_redeem(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
    Path(download_id): Path<String>,
) -> HttpResult<Json<downloads::RedeemResponse>> {
    Ok(Json(downloads::handle_redeem(ctx, claims, &download_id).await?))
}

async fn handle_create_admin(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
    body: Result<Json<admin::CreateAdminRequest>, JsonRejection>,
) -> HttpResult<(StatusCode, Json<admin::CreateAdminResponse>)> {
    let res = admin::handle_create_admin(ctx, claims, json_body(body)?).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

async fn handle_list_admins(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
) -> HttpResult<Json<admin::ListAdminsResponse>> {
    Ok(Json(admin::handle_list_admins(ctx, claims).await?))
}

async fn handle_update_permissions(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
    Path(admin_id): Path<String>,
    body: Result<Json<PermissionsPatch>, JsonRejection>,
) -> HttpResult<Json<admin::UpdatePermissionsResponse>> {
    let res = admin::handle_update_permissions(ctx, claims, &admin_id, json_body(body)?).await?;
    Ok(Json(res))
}

async fn handle_delete_admin(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
    Path(admin_id): Path<String>,
) -> HttpResult<Json<admin::MessageResponse>> {
    Ok(Json(admin::handle_delete_admin(ctx, claims, &admin_id).await?))
}

async fn handle_my_permissions(
    State(ctx): State<Arc<AppContext>>,
    Authenticated(claims): Authenticated,
) -> HttpResult<Json<Permissions>> {
    Ok(Json(admin::handle_my_permissions(ctx, claims).await?))
}

// ─── Middleware ─────────────────────────────────────────────────

/// Client IP from proxy headers; requests without one share the `unknown` bucket.
fn extract_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Normalize the request path by stripping the base path prefix.
fn normalize_path(path: &str, base_path: &str) -> String {
    let stripped = path.strip_prefix(base_path).unwrap_or(path);
    if stripped.is_empty() {
        "/".to_string()
    } else if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{stripped}")
    }
}

async fn rate_limit_middleware(
    State(ctx): State<Arc<AppContext>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum_mw::Next,
) -> Response {
    let ip = extract_ip(req.headers());
    let path = normalize_path(req.uri().path(), &ctx.options.base_path);

    if let Err(e) = ctx.rate_limiter.check(&ip, &path) {
        tracing::warn!(path = %path, "rate limit exceeded");
        return HttpError(e).into_response();
    }

    next.run(req).await
}

// ─── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "Bearer my-token-123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("my-token-123"));

        headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_extract_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_ip(&headers), "unknown");

        headers.insert("x-real-ip", "10.0.0.9".parse().unwrap());
        assert_eq!(extract_ip(&headers), "10.0.0.9");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(extract_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/api/auth/me", "/api"), "/auth/me");
        assert_eq!(normalize_path("/api", "/api"), "/");
        assert_eq!(normalize_path("/auth/me", "/api"), "/auth/me");
    }

    #[test]
    fn test_rate_limited_response_headers() {
        let response = HttpError(ServiceError::RateLimited {
            retry_after: 42,
            message: "slow down".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn test_error_status_mapping() {
        let response = HttpError(ServiceError::Forbidden).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = HttpError(ServiceError::Internal("boom".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
