use std::fmt;

use diesel::result::Error as DieselError;
use failure::{Backtrace, Context, Fail};
use serde_json;

use crate::client::email::ErrorKind as EmailClientErrorKind;
use crate::client::mercado_pago::ErrorKind as MercadoPagoErrorKind;
use crate::repos::ErrorKind as RepoErrorKind;

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Debug, PartialEq, Fail)]
pub enum ErrorKind {
    #[fail(display = "service error - not found")]
    NotFound,
    #[fail(display = "service error - forbidden")]
    Forbidden,
    #[fail(display = "service error - unauthorized")]
    Unauthorized,
    #[fail(display = "service error - invalid input, errors: {}", _0)]
    Validation(serde_json::Value),
    #[fail(display = "service error - invalid status transition")]
    InvalidTransition,
    #[fail(display = "service error - internal")]
    Internal,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorSource {
    #[fail(display = "service source - r2d2")]
    R2d2,
    #[fail(display = "service source - diesel")]
    Diesel,
    #[fail(display = "service source - jsonwebtoken")]
    Jwt,
    #[fail(display = "service source - serde_json")]
    SerdeJson,
    #[fail(display = "service source - tokio_timer")]
    TokioTimer,
}

#[allow(dead_code)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorContext {
    #[fail(display = "service context - user is not authenticated")]
    Unauthorized,
    #[fail(display = "service context - wrong email or password")]
    Credentials,
    #[fail(display = "service context - invalid session token")]
    Token,
    #[fail(display = "service context - user is suspended")]
    Suspended,
    #[fail(display = "service context - product state")]
    ProductState,
    #[fail(display = "service context - order state")]
    OrderState,
    #[fail(display = "service context - commission state")]
    CommissionState,
    #[fail(display = "service context - cart")]
    Cart,
    #[fail(display = "service context - combo rules")]
    Combo,
    #[fail(display = "service context - order bump rules")]
    OrderBump,
    #[fail(display = "service context - payment notification")]
    PaymentNotification,
    #[fail(display = "service context - amount overflow")]
    AmountOverflow,
}

derive_error_impls!();

impl From<RepoErrorKind> for ErrorKind {
    fn from(e: RepoErrorKind) -> Self {
        match e {
            RepoErrorKind::Constraints(errors) => ErrorKind::Validation(serde_json::to_value(errors).unwrap_or_default()),
            RepoErrorKind::Forbidden => ErrorKind::Forbidden,
            RepoErrorKind::NotFound => ErrorKind::NotFound,
            RepoErrorKind::Internal => ErrorKind::Internal,
        }
    }
}

impl From<MercadoPagoErrorKind> for ErrorKind {
    fn from(e: MercadoPagoErrorKind) -> Self {
        match e {
            MercadoPagoErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<EmailClientErrorKind> for ErrorKind {
    fn from(_: EmailClientErrorKind) -> Self {
        ErrorKind::Internal
    }
}

/// Needed by `Connection::transaction`, which reports begin/commit failures as diesel errors
impl From<DieselError> for Error {
    fn from(e: DieselError) -> Self {
        ectx!(err e, ErrorSource::Diesel, ErrorKind::Internal)
    }
}

/// Validation error with a single field message
pub fn validation_error(field: &'static str, code: &'static str, message: String) -> ErrorKind {
    let mut errors = validator::ValidationErrors::new();
    let mut error = validator::ValidationError::new(code);
    error.message = Some(message.into());
    errors.add(field, error);
    ErrorKind::Validation(serde_json::to_value(errors).unwrap_or_default())
}
