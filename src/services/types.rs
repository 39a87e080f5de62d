use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use futures::Future;
use futures_cpupool::CpuPool;
use r2d2::{ManageConnection, Pool, PooledConnection};

use super::error::*;

/// Service layer Future
pub type ServiceFuture<T> = Box<dyn Future<Item = T, Error = Error>>;

/// Runs blocking database work `f` on the cpu pool with a connection from `db_pool`
pub fn spawn_on_pool<T, M, Func, R>(db_pool: Pool<M>, cpu_pool: CpuPool, f: Func) -> ServiceFuture<R>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    M: ManageConnection<Connection = T>,
    Func: FnOnce(PooledConnection<M>) -> Result<R, Error> + Send + 'static,
    R: Send + 'static,
{
    Box::new(cpu_pool.spawn_fn(move || db_pool.get().map_err(ectx!(ErrorSource::R2d2, ErrorKind::Internal)).and_then(f)))
}
