//! Outgoing https client.
//!
//! hyper's client lives on the reactor thread, so requests are sent to it through
//! a channel by `ClientHandle`, which can be cloned and moved to any thread.

use std::fmt;
use std::time::Duration;

use failure::{Backtrace, Context, Fail};
use futures::future::{self, Either};
use futures::sync::{mpsc, oneshot};
use futures::{Future, Sink, Stream};
use hyper;
use hyper::client::HttpConnector;
use hyper::header::{ContentLength, ContentType, Headers};
use hyper::{Method, StatusCode};
use hyper_tls::HttpsConnector;
use serde::de::DeserializeOwned;
use serde_json;
use tokio_core::reactor::{Handle, Timeout};

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Debug, PartialEq, Fail)]
pub enum ErrorKind {
    #[fail(display = "http client error - malformed input")]
    MalformedInput,
    #[fail(display = "http client error - unauthorized")]
    Unauthorized,
    #[fail(display = "http client error - not found")]
    NotFound,
    #[fail(display = "http client error - unprocessable input")]
    Validation(serde_json::Value),
    #[fail(display = "http client error - timeout")]
    Timeout,
    #[fail(display = "http client error - internal error")]
    Internal,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorSource {
    #[fail(display = "http client source - hyper")]
    Hyper,
    #[fail(display = "http client source - hyper_tls")]
    HyperTls,
    #[fail(display = "http client source - serde_json")]
    SerdeJson,
    #[fail(display = "http client source - tokio_core")]
    TokioCore,
}

derive_error_impls!();

impl ErrorKind {
    /// Kind of a non-successful response
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::Unauthorized | StatusCode::Forbidden => ErrorKind::Unauthorized,
            StatusCode::NotFound => ErrorKind::NotFound,
            StatusCode::BadRequest | StatusCode::UnprocessableEntity => {
                ErrorKind::Validation(serde_json::from_str(body).unwrap_or_else(|_| json!({ "message": body })))
            }
            _ => ErrorKind::Internal,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Response {
    pub status: StatusCode,
    pub body: String,
}

pub type ClientFuture<T> = Box<dyn Future<Item = T, Error = Error> + Send>;

pub trait HttpClient: Send + Sync + 'static {
    fn request(&self, method: Method, url: String, body: Option<String>, headers: Option<Headers>) -> ClientFuture<Response>;

    /// Sends the request and deserializes a successful json response
    fn request_json<T>(&self, method: Method, url: String, body: Option<String>, headers: Option<Headers>) -> ClientFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        Box::new(self.request(method, url, body, headers).and_then(|response| {
            let Response { status, body } = response;
            if status.is_success() {
                serde_json::from_str::<T>(&body).map_err(ectx!(ErrorSource::SerdeJson, ErrorKind::Internal => body))
            } else {
                let kind = ErrorKind::from_response(status, &body);
                let e = format_err!("Request failed with status {}", status);
                Err(ectx!(err e, kind => body))
            }
        }))
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub http_client_buffer_size: usize,
    pub dns_worker_thread_count: usize,
    pub timeout: Duration,
}

impl<'a> From<&'a crate::config::Client> for Config {
    fn from(config: &crate::config::Client) -> Self {
        Config {
            http_client_buffer_size: config.http_client_buffer_size,
            dns_worker_thread_count: config.dns_worker_thread_count,
            timeout: Duration::from_millis(config.http_timeout_ms),
        }
    }
}

struct Payload {
    method: Method,
    url: String,
    body: Option<String>,
    headers: Option<Headers>,
    callback: oneshot::Sender<Result<Response, Error>>,
}

type HyperClient = hyper::Client<HttpsConnector<HttpConnector>>;

pub struct Client {
    client: HyperClient,
    handle: Handle,
    timeout: Duration,
    tx: mpsc::Sender<Payload>,
    rx: mpsc::Receiver<Payload>,
}

impl Client {
    pub fn new(config: &Config, handle: &Handle) -> Result<Self, Error> {
        let connector = HttpsConnector::new(config.dns_worker_thread_count, handle).map_err(ectx!(try ErrorSource::HyperTls, ErrorKind::Internal))?;
        let client = hyper::Client::configure().connector(connector).build(handle);
        let (tx, rx) = mpsc::channel(config.http_client_buffer_size);
        Ok(Client {
            client,
            handle: handle.clone(),
            timeout: config.timeout,
            tx,
            rx,
        })
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle { tx: self.tx.clone() }
    }

    /// Processes requests sent through handles, must be spawned on the reactor
    pub fn run(self) -> Box<dyn Future<Item = (), Error = ()>> {
        let Client {
            client,
            handle,
            timeout,
            rx,
            ..
        } = self;
        Box::new(rx.for_each(move |payload| {
            handle.spawn(Self::send(&client, &handle, timeout, payload));
            Ok(())
        }))
    }

    fn send(client: &HyperClient, handle: &Handle, timeout: Duration, payload: Payload) -> Box<dyn Future<Item = (), Error = ()>> {
        let Payload {
            method,
            url,
            body,
            headers,
            callback,
        } = payload;

        let uri = match url.parse::<hyper::Uri>() {
            Ok(uri) => uri,
            Err(e) => {
                let _ = callback.send(Err(ectx!(err e, ErrorSource::Hyper, ErrorKind::MalformedInput => url)));
                return Box::new(future::ok(()));
            }
        };
        let timer = match Timeout::new(timeout, handle) {
            Ok(timer) => timer,
            Err(e) => {
                let _ = callback.send(Err(ectx!(err e, ErrorSource::TokioCore, ErrorKind::Internal)));
                return Box::new(future::ok(()));
            }
        };

        debug!("Sending {} request to {}", method, url);
        let mut req = hyper::Request::new(method.clone(), uri);
        if let Some(headers) = headers {
            req.headers_mut().extend(headers.iter());
        }
        if let Some(body) = body {
            req.headers_mut().set(ContentType::json());
            req.headers_mut().set(ContentLength(body.len() as u64));
            req.set_body(body);
        }

        let response = client
            .request(req)
            .and_then(|res| {
                let status = res.status();
                res.body().concat2().map(move |chunk| Response {
                    status,
                    body: String::from_utf8_lossy(&chunk).into_owned(),
                })
            })
            .map_err({
                let url = url.clone();
                ectx!(ErrorSource::Hyper, ErrorKind::Internal => method, url)
            });

        Box::new(response.select2(timer).then(move |res| {
            let result = match res {
                Ok(Either::A((response, _))) => Ok(response),
                Ok(Either::B(_)) => {
                    let e = format_err!("Request timed out");
                    Err(ectx!(err e, ErrorKind::Timeout => url))
                }
                Err(Either::A((e, _))) => Err(e),
                Err(Either::B((e, _))) => Err(ectx!(err e, ErrorSource::TokioCore, ErrorKind::Internal => url)),
            };
            let _ = callback.send(result);
            Ok(())
        }))
    }
}

#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<Payload>,
}

impl HttpClient for ClientHandle {
    fn request(&self, method: Method, url: String, body: Option<String>, headers: Option<Headers>) -> ClientFuture<Response> {
        let (callback, response) = oneshot::channel();
        let payload = Payload {
            method,
            url,
            body,
            headers,
            callback,
        };

        Box::new(
            self.tx
                .clone()
                .send(payload)
                .map_err(|_| {
                    let e = format_err!("Http client is not running");
                    ectx!(err e, ErrorKind::Internal)
                })
                .and_then(|_| {
                    response.map_err(|e| ectx!(err e, ErrorKind::Internal)).and_then(|result| result)
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_from_response() {
        assert_eq!(ErrorKind::from_response(StatusCode::Unauthorized, ""), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_response(StatusCode::NotFound, ""), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_response(StatusCode::BadGateway, ""), ErrorKind::Internal);
        assert_eq!(
            ErrorKind::from_response(StatusCode::BadRequest, r#"{"message":"invalid email"}"#),
            ErrorKind::Validation(json!({"message": "invalid email"}))
        );
        assert_eq!(
            ErrorKind::from_response(StatusCode::UnprocessableEntity, "not json"),
            ErrorKind::Validation(json!({"message": "not json"}))
        );
    }
}
