use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use derive_more::{Display, Error};
use serde::Serialize;
use subscription_types::subscription::service::ServiceError;
use subscription_types::subscription::ChangeSetError;

pub type Response = Result<HttpResponse, ControllerError>;

#[derive(Debug, Display, Error)]
pub enum ControllerError {
    #[error(ignore)]
    NotFound(String),
    #[error(ignore)]
    #[display("Invalid id {_0}")]
    InvalidId(String),
    #[error(ignore)]
    #[display("Invalid field {field}: {msg}")]
    InvalidInput { field: String, msg: String },
    #[error(ignore)]
    #[display("Field '{_0}' cannot be updated")]
    DisallowedField(String),
    #[display("Request cancelled")]
    Cancelled,
    #[error(ignore)]
    InternalServerError(anyhow::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ControllerError {
    pub fn invalid_input<F: ToString, M: ToString>(field: F, msg: M) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            msg: msg.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidId(_) => "INVALID_ID",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::DisallowedField(_) => "DISALLOWED_FIELD",
            Self::Cancelled => "CANCELLED",
            Self::InternalServerError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ServiceError> for ControllerError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(id) => Self::NotFound(format!("subscription {id} not found")),
            ServiceError::ValidationFailure(err) => Self::invalid_input("subscription", err),
            ServiceError::DisallowedField(field) => Self::DisallowedField(field),
            ServiceError::InvalidChange(ChangeSetError::InvalidValue { field, msg }) => {
                Self::invalid_input(field, msg)
            }
            ServiceError::InvalidChange(ChangeSetError::DisallowedField(field)) => {
                Self::DisallowedField(field)
            }
            ServiceError::Cancelled => Self::Cancelled,
            err @ ServiceError::Persistence { .. } => {
                Self::InternalServerError(anyhow::anyhow!("{err}"))
            }
        }
    }
}

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

impl From<actix::MailboxError> for ControllerError {
    fn from(err: actix::MailboxError) -> Self {
        Self::InternalServerError(err.into())
    }
}

impl actix_web::error::ResponseError for ControllerError {
    fn status_code(&self) -> StatusCode {
        use ControllerError::*;
        match self {
            NotFound(_) => StatusCode::NOT_FOUND,
            InvalidId(_) | InvalidInput { .. } | DisallowedField(_) => StatusCode::BAD_REQUEST,
            Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::InternalServerError(err) => log::error!("{err:?}"),
            err => log::warn!("{err}"),
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::error::ResponseError;
    use subscription_types::subscription::{PatchField, ValidationError};
    use uuid::Uuid;

    #[test]
    fn maps_service_errors_to_status_codes() {
        let cases = [
            (ServiceError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (
                ServiceError::ValidationFailure(ValidationError::EndBeforeStart),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::DisallowedField("user_id".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::InvalidChange(ChangeSetError::InvalidValue {
                    field: PatchField::Price,
                    msg: "expected integer".to_string(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::Persistence {
                    operation: "create subscription",
                    source: anyhow::anyhow!("connection reset"),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ServiceError::Cancelled, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ControllerError::from(err).status_code(), status);
        }
    }

    #[test]
    fn keeps_operation_context_of_storage_failures() {
        let err = ControllerError::from(ServiceError::Persistence {
            operation: "patch subscription",
            source: anyhow::anyhow!("connection reset"),
        });
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(err.to_string().contains("patch subscription failed"));
    }
}
