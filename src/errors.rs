use hyper::StatusCode;
use serde_json;

use crate::http::errors::{Codeable, PayloadCarrier};
use crate::services::ErrorKind as ServiceErrorKind;

/// Errors known to the http layer, anything else in a chain is a 500
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "Not found")]
    NotFound,
    #[fail(display = "Parse error")]
    Parse,
    #[fail(display = "Validation error")]
    Validate(serde_json::Value),
    #[fail(display = "Authentication required")]
    Unauthorized,
    #[fail(display = "Server is refusing to fullfil the request")]
    Forbidden,
    #[fail(display = "Operation is not allowed in the current state")]
    Conflict,
    #[fail(display = "Internal server error")]
    Internal,
}

impl Codeable for Error {
    fn code(&self) -> StatusCode {
        match *self {
            Error::NotFound => StatusCode::NotFound,
            Error::Validate(_) => StatusCode::BadRequest,
            Error::Parse => StatusCode::UnprocessableEntity,
            Error::Unauthorized => StatusCode::Unauthorized,
            Error::Forbidden => StatusCode::Forbidden,
            Error::Conflict => StatusCode::Conflict,
            Error::Internal => StatusCode::InternalServerError,
        }
    }
}

impl PayloadCarrier for Error {
    fn payload(&self) -> Option<serde_json::Value> {
        match *self {
            Error::Validate(ref e) => Some(e.clone()),
            _ => None,
        }
    }
}

impl From<ServiceErrorKind> for Error {
    fn from(kind: ServiceErrorKind) -> Self {
        match kind {
            ServiceErrorKind::NotFound => Error::NotFound,
            ServiceErrorKind::Forbidden => Error::Forbidden,
            ServiceErrorKind::Unauthorized => Error::Unauthorized,
            ServiceErrorKind::Validation(payload) => Error::Validate(payload),
            ServiceErrorKind::InvalidTransition => Error::Conflict,
            ServiceErrorKind::Internal => Error::Internal,
        }
    }
}
