use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

/// Caller identity, taken verbatim from the `Authorization` header. The
/// gateway in front of this service is responsible for validating it; here
/// it only has to be a stable partition key per user.
#[derive(Debug, Clone)]
pub struct Identity(pub String);

pub async fn identity_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    match user {
        Some(user) => {
            req.extensions_mut().insert(Identity(user));
            Ok(next.run(req).await)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
