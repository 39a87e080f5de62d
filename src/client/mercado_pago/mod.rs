//! Mercado Pago REST client: checkout preferences and payment lookups

mod error;
pub mod mock;
mod types;

use std::fmt::Debug;
use std::sync::Arc;

use failure::Fail;
use futures::{Future, IntoFuture};
use hyper::header::Headers;
use hyper::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json;

use crate::config;
use crate::http::HttpClient;

pub use self::error::*;
pub use self::types::*;

pub trait MercadoPagoClient: Send + Sync + 'static {
    /// Creates a checkout preference, the buyer pays at `init_point`
    fn create_preference(&self, input: CreatePreference) -> Box<dyn Future<Item = Preference, Error = Error> + Send>;

    fn get_payment(&self, payment_id: String) -> Box<dyn Future<Item = Payment, Error = Error> + Send>;
}

impl<T: ?Sized + MercadoPagoClient> MercadoPagoClient for Arc<T> {
    fn create_preference(&self, input: CreatePreference) -> Box<dyn Future<Item = Preference, Error = Error> + Send> {
        (**self).create_preference(input)
    }

    fn get_payment(&self, payment_id: String) -> Box<dyn Future<Item = Payment, Error = Error> + Send> {
        (**self).get_payment(payment_id)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    pub access_token: String,
}

impl From<config::MercadoPago> for Config {
    fn from(config: config::MercadoPago) -> Self {
        let config::MercadoPago { url, access_token, .. } = config;
        Config { url, access_token }
    }
}

#[derive(Clone)]
pub struct MercadoPagoClientImpl<C: HttpClient + Clone> {
    client: C,
    url: String,
    access_token: String,
}

impl<C: HttpClient + Clone> MercadoPagoClientImpl<C> {
    pub fn new(client: C, config: Config) -> Self {
        let Config { url, access_token } = config;
        Self { client, url, access_token }
    }

    fn request_with_auth<Req, Res>(&self, method: Method, query: String, body: Option<Req>) -> impl Future<Item = Res, Error = Error> + Send
    where
        Req: Debug + Serialize + Send + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        let client = self.client.clone();
        let url = format!("{}{}", self.url, query);
        let mut headers = Headers::new();
        headers.set_raw("authorization", format!("Bearer {}", self.access_token));

        body.map(|body| serde_json::to_string(&body).map_err(ectx!(ErrorSource::SerdeJson, ErrorKind::Internal => body)))
            .transpose()
            .into_future()
            .and_then(move |body| {
                client
                    .request_json::<Res>(method.clone(), url.clone(), body.clone(), Some(headers))
                    .map_err(ectx!(convert ErrorSource::Http => method, url, body))
            })
    }
}

impl<C: HttpClient + Clone> MercadoPagoClient for MercadoPagoClientImpl<C> {
    fn create_preference(&self, input: CreatePreference) -> Box<dyn Future<Item = Preference, Error = Error> + Send> {
        let query = "/checkout/preferences".to_string();
        let external_reference = input.external_reference.clone();
        Box::new(
            self.request_with_auth::<_, Preference>(Method::Post, query, Some(input))
                .map_err(ectx!(convert => external_reference)),
        )
    }

    fn get_payment(&self, payment_id: String) -> Box<dyn Future<Item = Payment, Error = Error> + Send> {
        let query = format!("/v1/payments/{}", payment_id);
        Box::new(
            self.request_with_auth::<(), Payment>(Method::Get, query, None)
                .map_err(ectx!(convert => payment_id)),
        )
    }
}
