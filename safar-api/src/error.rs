use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use safar_core::{CoreError, GatewayError};
use safar_order::{EnquiryError, PaymentError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    /// A supplier answered with an error; its status and body are passed on
    /// untouched.
    #[error("upstream returned {status}")]
    UpstreamError { status: u16, body: String },
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::UpstreamError { status, body } => {
                tracing::warn!("Upstream error {}: {}", status, body);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "Upstream error", "status": status, "body": body }),
                )
            }
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg })),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::ValidationError(msg),
            CoreError::NotFound(msg) => AppError::NotFoundError(msg),
            CoreError::Conflict(msg) => AppError::ConflictError(msg),
            e @ CoreError::InvalidTransition { .. } => AppError::ConflictError(e.to_string()),
            CoreError::Forbidden(msg) => AppError::AuthorizationError(msg),
            CoreError::StorageError(msg) | CoreError::InternalError(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Upstream { status, body } => AppError::UpstreamError { status, body },
            GatewayError::RateLimited { attempts, body } => {
                tracing::warn!("Supplier still rate limited after {} attempts: {}", attempts, body);
                AppError::ServiceUnavailable("Supplier is busy, try again shortly".to_string())
            }
            GatewayError::Transport(msg) | GatewayError::Decode(msg) => AppError::UpstreamError {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                body: msg,
            },
            e @ (GatewayError::Crypto(_) | GatewayError::Config(_)) => AppError::InternalServerError(e.to_string()),
        }
    }
}

impl From<EnquiryError> for AppError {
    fn from(err: EnquiryError) -> Self {
        match err {
            e @ EnquiryError::NotFound(_) => AppError::NotFoundError(e.to_string()),
            e @ EnquiryError::Forbidden(_) => AppError::AuthorizationError(e.to_string()),
            EnquiryError::Core(core) => core.into(),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            e @ PaymentError::NotFound(_) => AppError::NotFoundError(e.to_string()),
            e @ PaymentError::Forbidden(_) => AppError::AuthorizationError(e.to_string()),
            e @ PaymentError::NotPayable(_) => AppError::ConflictError(e.to_string()),
            PaymentError::Gateway(gateway) => gateway.into(),
            PaymentError::Core(core) => core.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_taxonomy() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (CoreError::ValidationError("x".into()).into(), StatusCode::BAD_REQUEST),
            (AppError::AuthenticationError("x".into()), StatusCode::UNAUTHORIZED),
            (CoreError::Forbidden("x".into()).into(), StatusCode::FORBIDDEN),
            (CoreError::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (
                CoreError::InvalidTransition {
                    from: "DRAFT".into(),
                    to: "PAID".into(),
                    actor: "CUSTOMER".into(),
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (CoreError::StorageError("x".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_upstream_keeps_status_and_body() {
        let err: AppError = GatewayError::Upstream {
            status: 422,
            body: "{\"code\":\"BAD_DATE\"}".to_string(),
        }
        .into();
        assert!(matches!(
            &err,
            AppError::UpstreamError { status: 422, body } if body == "{\"code\":\"BAD_DATE\"}"
        ));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
