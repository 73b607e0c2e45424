use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use snipbox_types::api::ErrorBody;
use snipbox_types::validate::ValidationError;

/// Every failure a handler can answer with. The `Display` text is what the
/// client receives in [`ErrorBody::error`]; clients match on these strings,
/// so treat them as part of the wire format.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("User already registered")]
    EmailTaken,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Unsupported provider: provider is not enabled")]
    ProviderDisabled,

    #[error("OAuth sign-in failed")]
    OAuthFailed,

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Snippet not found")]
    SnippetNotFound,

    #[error("Not found")]
    NotFound,

    #[error("File too large. Maximum size is 2MB")]
    FileTooLarge,

    #[error("Unsupported image type")]
    UnsupportedMedia,

    #[error("Malformed payload")]
    MalformedPayload,

    /// Body, query or path did not parse. Carries the extractor's own
    /// status and message.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidCredentials
            | Self::InvalidResetToken
            | Self::ProviderDisabled
            | Self::MalformedPayload => StatusCode::BAD_REQUEST,
            Self::OAuthFailed => StatusCode::BAD_GATEWAY,
            Self::EmailTaken | Self::UsernameTaken => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::SnippetNotFound | Self::NotFound => StatusCode::NOT_FOUND,
            Self::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Rejected { status, .. } => *status,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Internal error: {:#}", e);
        Self::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Map a failed account or profile write to the conflict it represents.
pub(crate) fn account_conflict(e: anyhow::Error) -> ApiError {
    match snipbox_db::unique_violation(&e).as_deref() {
        Some("users.email") => ApiError::EmailTaken,
        Some("profiles.username") => ApiError::UsernameTaken,
        _ => e.into(),
    }
}
