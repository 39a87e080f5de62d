//! EDUPLAY is a marketplace of digital education products: courses, ebooks and apps
//! listed by producers, moderated by admins and paid through Mercado Pago.
//! The layered structure of the app is
//!
//! `Application -> Controller -> Service -> Repo + HttpClient`
//!
//! Each layer can only face exceptions in its base layers and can only expose its own errors.
//! E.g. `Service` layer will only deal with `Repo` and `HttpClient` errors and will only return
//! `ServiceError`. That way Controller will only have to deal with ServiceError, but not with `Repo`
//! or `HttpClient` repo.

extern crate config as config_crate;
#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate diesel;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate serde_json;
#[macro_use]
extern crate validator_derive;

#[macro_use]
pub mod macros;
pub mod client;
pub mod config;
pub mod controller;
pub mod errors;
pub mod http;
pub mod logger;
pub mod models;
pub mod reconciler;
pub mod repos;
pub mod schema;
pub mod sentry_integration;
pub mod services;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use diesel::pg::PgConnection;
use futures::future;
use futures::{Future, Stream};
use futures_cpupool::CpuPool;
use hyper::server::Http;
use r2d2_diesel::ConnectionManager;
use tokio_core::reactor::Core;

use self::client::email::mock::EmailClientMock;
use self::client::mercado_pago::mock::MercadoPagoClientMock;
use self::client::{EmailClient, EmailClientImpl, MercadoPagoClient, MercadoPagoClientImpl};
use self::config::Config;
use self::controller::context::StaticContext;
use self::errors::Error;
use self::http::client::{Client as HttpClientImpl, Config as HttpConfig};
use self::http::controller::error_chain_text;
use self::http::Application;
use self::reconciler::Reconciler;
use self::repos::acl::RolesCacheImpl;
use self::repos::repo_factory::ReposFactoryImpl;

/// Starts new web service from provided `Config`
pub fn start_server<F: FnOnce() + 'static>(config: Config, port: &Option<String>, callback: F) {
    // Prepare reactor
    let mut core = Core::new().expect("Unexpected error creating event loop core");
    let handle = Arc::new(core.handle());

    let http_client = HttpClientImpl::new(&HttpConfig::from(&config.client), &handle).expect("Failed to create http client");
    let client_handle = http_client.handle();
    handle.spawn(http_client.run());

    let payments_client: Arc<dyn MercadoPagoClient> = if config.mercado_pago.enabled {
        Arc::new(MercadoPagoClientImpl::new(client_handle.clone(), config.mercado_pago.clone().into()))
    } else {
        warn!("Mercado Pago is disabled, checkouts are not charged");
        Arc::new(MercadoPagoClientMock::default())
    };
    let email_client: Arc<dyn EmailClient> = if config.email.enabled {
        Arc::new(EmailClientImpl::new(client_handle.clone(), config.email.clone().into()))
    } else {
        warn!("Email sending is disabled, emails are only logged");
        Arc::new(EmailClientMock::default())
    };

    let thread_count = config.server.thread_count;

    // Prepare server
    let address = {
        let port = port.as_ref().unwrap_or(&config.server.port);
        format!("{}:{}", config.server.host, port).parse().expect("Could not parse address")
    };

    // Prepare database pool
    let manager = ConnectionManager::<PgConnection>::new(config.server.database.clone());
    let db_pool = r2d2::Pool::builder().build(manager).expect("Failed to create connection pool");

    // Prepare CPU pool
    let cpu_pool = CpuPool::new(thread_count);

    let roles_cache = RolesCacheImpl::default();
    let repo_factory = ReposFactoryImpl::new(roles_cache);

    let static_context = StaticContext::new(db_pool, cpu_pool, Arc::new(config.clone()), repo_factory, payments_client, email_client);

    if config.reconciler.enabled {
        let interval = Duration::from_secs(config.reconciler.interval_s);
        info!("Reconciling commissions every {}s", config.reconciler.interval_s);
        handle.spawn(
            Reconciler::new(static_context.clone())
                .run(interval)
                .map_err(|e| error!("Commissions reconciler stopped: {}", error_chain_text(&e))),
        );
    }

    let cors_origin = config.server.cors_origin.clone();
    let serve = Http::new()
        .serve_addr_handle(&address, &handle, move || {
            let controller = controller::ControllerImpl::new(static_context.clone());

            // Prepare application
            let app = Application::<Error>::new(controller, cors_origin.clone());

            Ok(app)
        })
        .unwrap_or_else(|why| {
            error!("Http Server Initialization Error: {}", why);
            process::exit(1);
        });

    let handle_arc2 = handle.clone();
    handle.spawn(
        serve
            .for_each(move |conn| {
                handle_arc2.spawn(conn.map(|_| ()).map_err(|why| error!("Server Error: {:?}", why)));
                Ok(())
            })
            .map_err(|_| ()),
    );

    info!("Listening on http://{}, threads: {}", address, thread_count);
    handle.spawn_fn(move || {
        callback();
        future::ok(())
    });

    let shutdown = tokio_signal::ctrl_c()
        .flatten_stream()
        .into_future()
        .map(|_| info!("Received ctrl-c, shutting down"))
        .map_err(|(e, _)| error!("Failed to listen for ctrl-c: {}", e));
    let _ = core.run(shutdown);
}
