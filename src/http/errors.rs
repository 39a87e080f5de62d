//! Traits that let the `Application` turn an error into an http response

use hyper::StatusCode;
use serde_json;

/// Http status code of an error
pub trait Codeable {
    fn code(&self) -> StatusCode;
}

/// Extra json attached to an error response, e.g. field validation errors
pub trait PayloadCarrier {
    fn payload(&self) -> Option<serde_json::Value>;
}

/// Body of every error response
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorMessage {
    pub code: u16,
    pub description: String,
    pub payload: Option<serde_json::Value>,
}

impl ErrorMessage {
    pub fn new<E: Codeable + PayloadCarrier>(error: &E, description: String) -> Self {
        ErrorMessage {
            code: error.code().as_u16(),
            description,
            payload: error.payload(),
        }
    }

    pub fn internal() -> Self {
        ErrorMessage {
            code: StatusCode::InternalServerError.as_u16(),
            description: "Internal server error".to_string(),
            payload: None,
        }
    }
}
