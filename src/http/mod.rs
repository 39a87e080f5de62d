//! Http plumbing: the server side `Application`, routing, request helpers
//! and the outgoing client used by the external service clients.

pub mod client;
pub mod controller;
pub mod errors;
pub mod request_util;
pub mod router;

pub use self::client::{ClientHandle, HttpClient};
pub use self::controller::{Application, Controller, ControllerFuture};
pub use self::errors::{Codeable, PayloadCarrier};
pub use self::router::RouteParser;
