//! Periodic job creating the commissions missing for paid orders,
//! e.g. when a webhook was processed while the database was unavailable.

use std::time::{Duration, Instant};

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::{Error as FailureError, Fail};
use futures::{future, Future, Stream};
use r2d2::ManageConnection;
use tokio_timer::Interval;

use crate::controller::context::{DynamicContext, StaticContext};
use crate::http::controller::error_chain_text;
use crate::repos::repo_factory::ReposFactory;
use crate::services::commissions::CommissionsService;
use crate::services::Service;

pub struct Reconciler<T, M, F>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    M: ManageConnection<Connection = T>,
    F: ReposFactory<T>,
{
    pub static_context: StaticContext<T, M, F>,
}

impl<T, M, F> Reconciler<T, M, F>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    M: ManageConnection<Connection = T>,
    F: ReposFactory<T>,
{
    pub fn new(static_context: StaticContext<T, M, F>) -> Self {
        Self { static_context }
    }

    /// Never resolves unless the timer fails. Failed runs are logged and retried on the next tick.
    pub fn run(self, interval: Duration) -> impl Future<Item = (), Error = FailureError> {
        Interval::new(Instant::now(), interval)
            .map_err(|e| FailureError::from(e.context("Reconciliation timer error")))
            .fold(self, |reconciler, _| {
                debug!("Started commissions reconciliation");
                reconciler.reconcile_once().then(|res| {
                    match res {
                        Ok(created) if created > 0 => info!("Reconciliation created {} missing commissions", created),
                        Ok(_) => debug!("Finished commissions reconciliation, nothing to do"),
                        Err(err) => {
                            error!("Commissions reconciliation failed: {}", error_chain_text(&err));
                            crate::sentry_integration::capture_failure(&err);
                        }
                    };

                    future::ok::<_, FailureError>(reconciler)
                })
            })
            .map(|_| ())
    }

    fn reconcile_once(&self) -> impl Future<Item = usize, Error = FailureError> {
        let service = Service::new(self.static_context.clone(), DynamicContext::default());
        service
            .reconcile_missing_commissions()
            .map(|response| response.created.len())
            .map_err(|e| FailureError::from(e.context("An error occurred while reconciling commissions")))
    }
}
