//! `Context` is a top level module contains static context and dynamic context for each request
use std::sync::Arc;

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use futures_cpupool::CpuPool;
use r2d2::{ManageConnection, Pool};

use crate::client::{EmailClient, MercadoPagoClient};
use crate::config::Config;
use crate::models::UserId;
use crate::repos::repo_factory::*;

/// Static context for all app
pub struct StaticContext<T, M, F>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    M: ManageConnection<Connection = T>,
    F: ReposFactory<T>,
{
    pub db_pool: Pool<M>,
    pub cpu_pool: CpuPool,
    pub config: Arc<Config>,
    pub repo_factory: F,
    pub payments_client: Arc<dyn MercadoPagoClient>,
    pub email_client: Arc<dyn EmailClient>,
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > StaticContext<T, M, F>
{
    /// Create a new static context
    pub fn new(
        db_pool: Pool<M>,
        cpu_pool: CpuPool,
        config: Arc<Config>,
        repo_factory: F,
        payments_client: Arc<dyn MercadoPagoClient>,
        email_client: Arc<dyn EmailClient>,
    ) -> Self {
        Self {
            db_pool,
            cpu_pool,
            config,
            repo_factory,
            payments_client,
            email_client,
        }
    }
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Clone for StaticContext<T, M, F>
{
    fn clone(&self) -> Self {
        Self {
            db_pool: self.db_pool.clone(),
            cpu_pool: self.cpu_pool.clone(),
            config: self.config.clone(),
            repo_factory: self.repo_factory.clone(),
            payments_client: self.payments_client.clone(),
            email_client: self.email_client.clone(),
        }
    }
}

/// Dynamic context for each request
#[derive(Clone, Debug, Default)]
pub struct DynamicContext {
    pub user_id: Option<UserId>,
    pub correlation_token: String,
}

impl DynamicContext {
    /// Create a new dynamic context for each request
    pub fn new(user_id: Option<UserId>, correlation_token: String) -> Self {
        Self { user_id, correlation_token }
    }
}
