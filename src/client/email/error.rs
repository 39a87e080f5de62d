use std::fmt;

use failure::{Backtrace, Context, Fail};
use serde_json;

use crate::http::client::ErrorKind as HttpErrorKind;

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "email client error - malformed input")]
    MalformedInput,
    #[fail(display = "email client error - unauthorized")]
    Unauthorized,
    #[fail(display = "email client error - not found")]
    NotFound,
    #[fail(display = "email client error - internal error")]
    Internal,
    #[fail(display = "email client error - unprocessable input")]
    Validation(serde_json::Value),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorSource {
    #[fail(display = "email client source - serde_json")]
    SerdeJson,
    #[fail(display = "email client source - http client")]
    Http,
}

derive_error_impls!();

impl From<HttpErrorKind> for ErrorKind {
    fn from(kind: HttpErrorKind) -> Self {
        match kind {
            HttpErrorKind::MalformedInput => ErrorKind::MalformedInput,
            HttpErrorKind::Unauthorized => ErrorKind::Unauthorized,
            HttpErrorKind::NotFound => ErrorKind::NotFound,
            HttpErrorKind::Validation(payload) => ErrorKind::Validation(payload),
            HttpErrorKind::Timeout | HttpErrorKind::Internal => ErrorKind::Internal,
        }
    }
}
