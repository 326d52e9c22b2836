//! API Middleware
//!
//! Principal resolution and request logging. Authentication itself happens
//! at the gateway; this service only reads the member id it forwards.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::AppError;

/// Header carrying the member id resolved by the gateway
pub const MEMBER_ID_HEADER: &str = "X-Member-Id";

/// Header carrying the caller's correlation id
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Member resolved from the `X-Member-Id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedMember {
    pub member_id: i32,
}

/// Parse a member id header value: a positive integer
pub fn parse_member_id(value: &str) -> Result<i32, AppError> {
    match value.trim().parse::<i32>() {
        Ok(member_id) if member_id > 0 => Ok(member_id),
        _ => Err(AppError::InvalidPrincipal(value.to_string())),
    }
}

// =========================================================================
// M230: Principal Middleware
// =========================================================================

/// Resolve the principal and the operation context.
///
/// A missing `X-Member-Id` is not an error here: routes that need a member
/// reject the request themselves. A malformed one is rejected for every
/// route.
pub async fn principal_middleware(
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let member = match headers.get(MEMBER_ID_HEADER) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| AppError::InvalidPrincipal("[invalid utf8]".to_string()))?;
            Some(AuthenticatedMember {
                member_id: parse_member_id(value)?,
            })
        }
        None => None,
    };

    // Extract correlation ID or generate new one
    let correlation_id = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new().with_correlation_id(correlation_id);
    if let Some(member) = member {
        context = context.with_member(member.member_id);
        request.extensions_mut().insert(member);
    }
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// =========================================================================
// M231: mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-gateway-signature",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// M232: Request Logging Middleware
// =========================================================================

/// Request logging middleware. Runs inside the principal middleware so the
/// correlation id is known.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let headers = mask_headers_for_logging(request.headers());

    let (correlation_id, member_id) = request
        .extensions()
        .get::<OperationContext>()
        .map(|ctx| (ctx.correlation_id, ctx.member_id))
        .unwrap_or_default();

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        member_id = ?member_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
