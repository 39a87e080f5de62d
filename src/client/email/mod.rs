//! Transactional email through SendGrid

mod error;
pub mod mock;
mod types;

use std::sync::Arc;

use failure::Fail;
use futures::{Future, IntoFuture};
use hyper::header::Headers;
use hyper::Method;
use serde_json;

use crate::config;
use crate::http::client::{ErrorKind as HttpErrorKind, Response};
use crate::http::HttpClient;

pub use self::error::*;
pub use self::types::*;

pub trait EmailClient: Send + Sync + 'static {
    fn send(&self, email: Email) -> Box<dyn Future<Item = (), Error = Error> + Send>;
}

impl<T: ?Sized + EmailClient> EmailClient for Arc<T> {
    fn send(&self, email: Email) -> Box<dyn Future<Item = (), Error = Error> + Send> {
        (**self).send(email)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    pub api_key: String,
    pub from: String,
}

impl From<config::Email> for Config {
    fn from(config: config::Email) -> Self {
        let config::Email { url, api_key, from, .. } = config;
        Config { url, api_key, from }
    }
}

#[derive(Clone)]
pub struct EmailClientImpl<C: HttpClient + Clone> {
    client: C,
    url: String,
    api_key: String,
    from: String,
}

impl<C: HttpClient + Clone> EmailClientImpl<C> {
    pub fn new(client: C, config: Config) -> Self {
        let Config { url, api_key, from } = config;
        Self {
            client,
            url,
            api_key,
            from,
        }
    }
}

impl<C: HttpClient + Clone> EmailClient for EmailClientImpl<C> {
    fn send(&self, email: Email) -> Box<dyn Future<Item = (), Error = Error> + Send> {
        let client = self.client.clone();
        let url = format!("{}/v3/mail/send", self.url);
        let mut headers = Headers::new();
        headers.set_raw("authorization", format!("Bearer {}", self.api_key));
        let to = email.to.clone();
        let to_cloned = to.clone();

        // SendGrid answers 202 with an empty body
        Box::new(
            serde_json::to_string(&SendMail::new(self.from.clone(), email))
                .map_err(ectx!(ErrorSource::SerdeJson, ErrorKind::Internal => to_cloned))
                .into_future()
                .and_then(move |body| {
                    client
                        .request(Method::Post, url.clone(), Some(body), Some(headers))
                        .map_err(ectx!(convert ErrorSource::Http => url))
                        .and_then(move |response| {
                            let Response { status, body } = response;
                            if status.is_success() {
                                Ok(())
                            } else {
                                let kind: ErrorKind = HttpErrorKind::from_response(status, &body).into();
                                let e = format_err!("SendGrid responded with {}", status);
                                Err(ectx!(err e, kind => to, body))
                            }
                        })
                }),
        )
    }
}
