use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::jobs::waiver_reminders::JobError;
use crate::services::{
    belts::PromotionError,
    billing::BillingError,
    check_in::CheckInError,
    credentials::CredentialError,
    email::EmailError,
    enrollment::EnrollmentError,
    family::FamilyError,
    promotions::PromotionServiceError,
    qr_generator,
    stripe::StripeError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Payment processor error: {0}")]
    Payment(#[from] StripeError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("QR code error: {0}")]
    Qr(#[from] qr_generator::QrGenerationError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<PromotionError> for AppError {
    fn from(e: PromotionError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<PromotionServiceError> for AppError {
    fn from(e: PromotionServiceError) -> Self {
        match e {
            PromotionServiceError::Database(e) => AppError::Database(e),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<EnrollmentError> for AppError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::Validation(msg) => AppError::Validation(msg),
            EnrollmentError::DuplicateEmail => AppError::Conflict(e.to_string()),
            EnrollmentError::Database(e) => AppError::Database(e),
            EnrollmentError::Payment(e) => AppError::Payment(e),
            EnrollmentError::Credentials(e) => e.into(),
            EnrollmentError::InvalidBaseUrl(e) => AppError::Config(e.to_string()),
        }
    }
}

impl From<CheckInError> for AppError {
    fn from(e: CheckInError) -> Self {
        match e {
            CheckInError::DatabaseError(e) => AppError::Database(e),
            CheckInError::MemberNotFound | CheckInError::ClassNotFound => {
                AppError::NotFound(e.to_string())
            }
            CheckInError::AlreadyCheckedIn | CheckInError::ClassFull => {
                AppError::Conflict(e.to_string())
            }
            CheckInError::MissingCredential
            | CheckInError::MalformedPin
            | CheckInError::MembershipInactive(_)
            | CheckInError::WaiverInvalid(_)
            | CheckInError::AgeNotAdmitted(_) => AppError::Validation(e.to_string()),
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Database(e) => AppError::Database(e),
            other => AppError::Internal(anyhow::anyhow!(other)),
        }
    }
}

impl From<FamilyError> for AppError {
    fn from(e: FamilyError) -> Self {
        match e {
            FamilyError::Database(e) => AppError::Database(e),
            FamilyError::AccountNotFound | FamilyError::MemberNotFound => {
                AppError::NotFound(e.to_string())
            }
            FamilyError::AlreadyInFamily => AppError::Conflict(e.to_string()),
            FamilyError::NotInFamily | FamilyError::CannotRemovePrimary => {
                AppError::Validation(e.to_string())
            }
        }
    }
}

impl From<BillingError> for AppError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::Database(e) => AppError::Database(e),
            BillingError::MalformedEvent(..) => AppError::Validation(e.to_string()),
        }
    }
}

impl From<JobError> for AppError {
    fn from(e: JobError) -> Self {
        AppError::Internal(anyhow::anyhow!(e))
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(e: tower_sessions::session::Error) -> Self {
        AppError::Session(e.to_string())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_)
            | AppError::Payment(_)
            | AppError::Email(_)
            | AppError::Qr(_)
            | AppError::Session(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Downstream failures are logged in full and reported generically
        let error_message = match &self {
            AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::Database(_) => {
                tracing::error!(error = ?self, "Database failure");
                "Database error".to_string()
            }
            AppError::Payment(_) => {
                tracing::error!(error = ?self, "Payment processor failure");
                "Payment processor error".to_string()
            }
            _ => {
                tracing::error!(error = ?self, "Request failed");
                "Internal server error".to_string()
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_check_in_error_mapping() {
        let cases = [
            (CheckInError::MissingCredential, StatusCode::BAD_REQUEST),
            (CheckInError::MalformedPin, StatusCode::BAD_REQUEST),
            (CheckInError::MemberNotFound, StatusCode::NOT_FOUND),
            (CheckInError::ClassNotFound, StatusCode::NOT_FOUND),
            (CheckInError::WaiverInvalid("expired"), StatusCode::BAD_REQUEST),
            (CheckInError::AlreadyCheckedIn, StatusCode::CONFLICT),
            (CheckInError::ClassFull, StatusCode::CONFLICT),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_enrollment_error_mapping() {
        assert_eq!(
            AppError::from(EnrollmentError::DuplicateEmail).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(EnrollmentError::Validation("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_family_error_mapping() {
        assert_eq!(
            AppError::from(FamilyError::CannotRemovePrimary).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(FamilyError::AccountNotFound).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_promotion_error_is_validation() {
        let err: AppError = PromotionError::UnknownBelt("pink".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
