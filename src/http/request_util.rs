//! Helpers for reading request bodies, query strings and headers

use std::collections::HashMap;
use std::fmt::Debug;

use failure::{Error as FailureError, Fail};
use futures::{future, Future, IntoFuture, Stream};
use hyper;
use hyper::header::{Authorization, Bearer, Headers};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json;

use super::controller::ControllerFuture;
use crate::errors::Error;

/// Reads the whole body and deserializes it from json
pub fn parse_body<T>(body: hyper::Body) -> Box<dyn Future<Item = T, Error = FailureError>>
where
    T: DeserializeOwned + 'static,
{
    Box::new(
        body.concat2()
            .map_err(|e| FailureError::from(e.context(Error::Parse)))
            .and_then(|chunk| {
                serde_json::from_slice::<T>(&chunk)
                    .map_err(|e| e.context(Error::Parse).into())
                    .into_future()
            }),
    )
}

/// Serializes the output of a service call into json
pub fn serialize_future<T, E, F>(f: F) -> ControllerFuture
where
    F: IntoFuture<Item = T, Error = E> + 'static,
    E: Into<FailureError> + 'static,
    T: Serialize + 'static,
{
    Box::new(f.into_future().map_err(Into::into).and_then(|resp| {
        serde_json::to_string(&resp)
            .map_err(|e| e.context(Error::Internal).into())
            .into_future()
    }))
}

/// Parses a query string into a map. Repeated keys keep the last value.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = percent_decode(parts.next().unwrap_or_default());
            let value = percent_decode(parts.next().unwrap_or_default());
            (key, value)
        })
        .collect()
}

/// Value of `key` parsed as `T`, None if absent or malformed
pub fn query_param<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str) -> Option<T> {
    params.get(key).and_then(|value| value.parse().ok())
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => decoded.push(b' '),
            b'%' if i + 2 < bytes.len() => match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                (Some(high), Some(low)) => {
                    decoded.push(high * 16 + low);
                    i += 2;
                }
                _ => decoded.push(b'%'),
            },
            byte => decoded.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &Headers) -> Option<String> {
    headers.get::<Authorization<Bearer>>().map(|auth| auth.0.token.clone())
}

/// Future failing with `error` in the controller error chain
pub fn controller_error<T: 'static, M: Debug + Send + Sync + 'static>(error: Error, message: M) -> Box<dyn Future<Item = T, Error = FailureError>> {
    Box::new(future::err(format_err!("{:?}", message).context(error).into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let params = parse_query(Some("skip=10&count=5&title=rust%20course&kind=ebook&empty="));
        assert_eq!(query_param::<i64>(&params, "skip"), Some(10));
        assert_eq!(query_param::<i64>(&params, "count"), Some(5));
        assert_eq!(params.get("title").map(String::as_str), Some("rust course"));
        assert_eq!(params.get("empty").map(String::as_str), Some(""));
        assert_eq!(query_param::<i64>(&params, "kind"), None);
        assert_eq!(query_param::<i64>(&params, "missing"), None);
    }

    #[test]
    fn test_parse_query_handles_junk() {
        assert!(parse_query(None).is_empty());
        let params = parse_query(Some("a=1+2&b=100%&&c"));
        assert_eq!(params.get("a").map(String::as_str), Some("1 2"));
        assert_eq!(params.get("b").map(String::as_str), Some("100%"));
        assert_eq!(params.get("c").map(String::as_str), Some(""));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = Headers::new();
        assert_eq!(bearer_token(&headers), None);
        headers.set(Authorization(Bearer {
            token: "abc.def.ghi".to_string(),
        }));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi".to_string()));
    }
}
