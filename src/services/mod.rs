//! Services is a core layer for the app business logic like
//! validation, authorization, etc.

pub mod apps;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod combos;
pub mod commissions;
pub mod dashboard;
pub mod error;
pub mod gamification;
pub mod order_bumps;
pub mod orders;
pub mod products;
pub mod types;
pub mod users;

pub use self::error::*;

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use futures::Future;
use r2d2::{ManageConnection, PooledConnection};
use serde_json;
use validator::Validate;

use self::types::{spawn_on_pool, ServiceFuture};
use crate::client::email::Email;
use crate::controller::context::{DynamicContext, StaticContext};
use crate::models::{ListingStatus, Role, User, UserId};
use crate::repos::ReposFactory;

/// Service with the static context of the app and the dynamic context of a request
pub struct Service<
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    M: ManageConnection<Connection = T>,
    F: ReposFactory<T>,
> {
    pub static_context: StaticContext<T, M, F>,
    pub dynamic_context: DynamicContext,
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Service<T, M, F>
{
    pub fn new(static_context: StaticContext<T, M, F>, dynamic_context: DynamicContext) -> Self {
        Self {
            static_context,
            dynamic_context,
        }
    }

    /// Runs blocking database work on the cpu pool
    pub fn spawn_on_pool<R, Func>(&self, f: Func) -> ServiceFuture<R>
    where
        Func: FnOnce(PooledConnection<M>) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        spawn_on_pool(self.static_context.db_pool.clone(), self.static_context.cpu_pool.clone(), f)
    }

    /// Sends `email` once `fut` succeeds. Failures to send are logged and never fail `fut`.
    pub fn notify_after<R: 'static>(&self, fut: ServiceFuture<R>, email: impl FnOnce(&R) -> Option<Email> + 'static) -> ServiceFuture<R> {
        let email_client = self.static_context.email_client.clone();
        Box::new(fut.and_then(move |result| {
            let sending: ServiceFuture<()> = match email(&result) {
                Some(email) => {
                    let to = email.to.clone();
                    Box::new(email_client.send(email).then(move |res| {
                        if let Err(e) = res {
                            error!("Failed to send email to {}: {}", to, e);
                        }
                        Ok::<(), Error>(())
                    }))
                }
                None => Box::new(futures::future::ok(())),
            };
            sending.map(move |_| result)
        }))
    }
}

/// Active user making the request. Anonymous requests and suspended users are unauthorized.
pub fn current_user<T, F>(repo_factory: &F, conn: &T, user_id: Option<UserId>) -> Result<User, Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    let user_id = user_id.ok_or_else(|| ectx!(try err ErrorContext::Unauthorized, ErrorKind::Unauthorized))?;
    let users_repo = repo_factory.create_users_repo_with_sys_acl(conn);
    let user = users_repo
        .get(user_id)
        .map_err(ectx!(try convert => user_id))?
        .ok_or_else(|| ectx!(try err ErrorContext::Unauthorized, ErrorKind::Unauthorized => user_id))?;
    if !user.is_active() {
        return Err(ectx!(err ErrorContext::Suspended, ErrorKind::Unauthorized => user_id));
    }
    Ok(user)
}

/// Fails with `Forbidden` unless `user` has one of `roles`
pub fn require_role(user: &User, roles: &[Role]) -> Result<(), Error> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        let e = format_err!("Role {} is not allowed, expected one of {:?}", user.role, roles);
        Err(ectx!(err e, ErrorKind::Forbidden => user.id))
    }
}

/// Checks the listing workflow for `actor` moving an item of `owner_id` from `current` to `next`
pub fn check_listing_transition(current: ListingStatus, next: ListingStatus, actor: &User, owner_id: UserId) -> Result<(), Error> {
    if current.can_transition_to(next, actor.role, actor.id == owner_id) {
        Ok(())
    } else {
        let e = format_err!("Listing cannot go from {} to {} by {}", current, next, actor.role);
        Err(ectx!(err e, ErrorContext::ProductState, ErrorKind::InvalidTransition => actor.id, owner_id))
    }
}

/// Each moderation action applies to listings in exactly one status
pub fn check_listing_source(current: ListingStatus, required: ListingStatus) -> Result<(), Error> {
    if current == required {
        Ok(())
    } else {
        let e = format_err!("Listing is {}, expected {}", current, required);
        Err(ectx!(err e, ErrorContext::ProductState, ErrorKind::InvalidTransition => current, required))
    }
}

/// Validates a request payload, field errors go to the validation payload
pub fn validate<V: Validate>(payload: &V) -> Result<(), Error> {
    payload.validate().map_err(|e| {
        let payload = serde_json::to_value(&e).unwrap_or_default();
        ectx!(err e, ErrorKind::Validation(payload))
    })
}

/// Like `current_user`, but anonymous requests give None
pub fn optional_user<T, F>(repo_factory: &F, conn: &T, user_id: Option<UserId>) -> Result<Option<User>, Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    match user_id {
        Some(_) => current_user(repo_factory, conn, user_id).map(Some),
        None => Ok(None),
    }
}

/// Message to a producer about a moderation decision on one of their listings
pub fn moderation_email(producer: &User, listing: &str, status: ListingStatus, reason: Option<&str>) -> Email {
    let (subject, text) = match (status, reason) {
        (ListingStatus::Published, _) => (
            format!("\"{}\" is published", listing),
            format!("Hi {},\n\n\"{}\" was approved and is now visible in the EDUPLAY catalog.", producer.name, listing),
        ),
        (_, Some(reason)) => (
            format!("\"{}\" needs changes", listing),
            format!("Hi {},\n\n\"{}\" was moved back to draft. Reason: {}", producer.name, listing, reason),
        ),
        (_, None) => (
            format!("\"{}\" was unpublished", listing),
            format!("Hi {},\n\n\"{}\" was moved back to draft by the moderation team.", producer.name, listing),
        ),
    };
    Email::new(producer.email.clone(), subject, text)
}
