//! hyper `Service` wrapping a `Controller`: serializes results and errors into json responses

use std::marker::PhantomData;

use failure::{Context, Error as FailureError, Fail};
use futures::{future, Future};
use hyper;
use hyper::header::{ContentLength, ContentType};
use hyper::server::{Request, Response, Service};
use hyper::{Method, StatusCode};
use serde_json;

use super::errors::{Codeable, ErrorMessage, PayloadCarrier};

/// Json body of a successful response, or the error chain
pub type ControllerFuture = Box<dyn Future<Item = String, Error = FailureError>>;
pub type ServerFuture = Box<dyn Future<Item = Response, Error = hyper::Error>>;

pub trait Controller {
    fn call(&self, request: Request) -> ControllerFuture;
}

pub struct Application<E> {
    pub controller: Box<dyn Controller>,
    pub cors_origin: Option<String>,
    _error: PhantomData<E>,
}

impl<E> Application<E>
where
    E: Fail + Codeable + PayloadCarrier,
{
    pub fn new<C: Controller + 'static>(controller: C, cors_origin: Option<String>) -> Self {
        Self {
            controller: Box::new(controller),
            cors_origin,
            _error: PhantomData,
        }
    }

    fn response_with_body(status: StatusCode, body: String) -> Response {
        Response::new()
            .with_status(status)
            .with_header(ContentLength(body.len() as u64))
            .with_header(ContentType::json())
            .with_body(body)
    }

    /// Finds the first `E` in the chain, bare or as a context. Anything else is an internal error.
    fn response_with_error(error: &FailureError) -> Response {
        let known = error
            .iter_chain()
            .filter_map(|cause| {
                cause
                    .downcast_ref::<E>()
                    .or_else(|| cause.downcast_ref::<Context<E>>().map(|context| context.get_context()))
            })
            .next();
        let (status, message) = match known {
            Some(e) => (e.code(), ErrorMessage::new(e, e.to_string())),
            None => (StatusCode::InternalServerError, ErrorMessage::internal()),
        };

        if status == StatusCode::InternalServerError {
            error!("{}", error_chain_text(error));
            crate::sentry_integration::capture_failure(error);
        } else {
            debug!("Request failed with {}: {}", status, error_chain_text(error));
        }

        let body = serde_json::to_string(&message).unwrap_or_else(|_| r#"{"code":500,"description":"Internal server error","payload":null}"#.to_string());
        Self::response_with_body(status, body)
    }

    fn with_cors(cors_origin: &Option<String>, mut response: Response) -> Response {
        if let Some(origin) = cors_origin {
            let headers = response.headers_mut();
            headers.set_raw("access-control-allow-origin", origin.clone());
            headers.set_raw("access-control-allow-methods", "GET, POST, PUT, DELETE, OPTIONS");
            headers.set_raw("access-control-allow-headers", "authorization, content-type");
        }
        response
    }
}

impl<E> Service for Application<E>
where
    E: Fail + Codeable + PayloadCarrier,
{
    type Request = Request;
    type Response = Response;
    type Error = hyper::Error;
    type Future = ServerFuture;

    fn call(&self, req: Request) -> ServerFuture {
        debug!("Received request: {} {}", req.method(), req.uri());

        if *req.method() == Method::Options {
            let response = Response::new().with_status(StatusCode::NoContent);
            return Box::new(future::ok(Self::with_cors(&self.cors_origin, response)));
        }

        let cors_origin = self.cors_origin.clone();
        Box::new(self.controller.call(req).then(move |res| {
            let response = match res {
                Ok(body) => Self::response_with_body(StatusCode::Ok, body),
                Err(err) => Self::response_with_error(&err),
            };
            future::ok(Self::with_cors(&cors_origin, response))
        }))
    }
}

/// Error with all its causes on one line
pub fn error_chain_text(error: &FailureError) -> String {
    error.iter_chain().map(|cause| cause.to_string()).collect::<Vec<_>>().join("; ")
}
