//! Repo for order_bumps table

use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Fail;

use crate::models::authorization::*;
use crate::models::{NewOrderBump, OrderBump, OrderBumpId, ProductId, UserId};
use crate::schema::order_bumps::dsl as OrderBumps;

use super::acl::{self, Acl, CheckScope};
use super::error::*;
use super::types::RepoResult;

pub type OrderBumpsRepoAcl = Box<dyn Acl<OrderBump>>;

pub trait OrderBumpsRepo {
    fn get(&self, order_bump_id: OrderBumpId) -> RepoResult<Option<OrderBump>>;

    /// Bumps offered when `product_id` is bought
    fn list_by_product(&self, product_id: ProductId, active_only: bool) -> RepoResult<Vec<OrderBump>>;

    fn list_by_ids(&self, ids: &[OrderBumpId]) -> RepoResult<Vec<OrderBump>>;

    fn create(&self, payload: NewOrderBump) -> RepoResult<OrderBump>;

    fn set_active(&self, order_bump_id: OrderBumpId, active: bool) -> RepoResult<OrderBump>;

    fn delete(&self, order_bump_id: OrderBumpId) -> RepoResult<OrderBump>;
}

pub struct OrderBumpsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: OrderBumpsRepoAcl,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> OrderBumpsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: OrderBumpsRepoAcl) -> Self {
        Self { db_conn, acl }
    }

    fn check_read(&self, bumps: &[OrderBump]) -> RepoResult<()> {
        for bump in bumps {
            acl::check(&*self.acl, Resource::OrderBumps, Action::Read, self, Some(bump)).map_err(ectx!(try ErrorKind::Forbidden))?;
        }
        Ok(())
    }

    fn get_for_write(&self, order_bump_id: OrderBumpId) -> RepoResult<OrderBump> {
        let bump = OrderBumps::order_bumps
            .filter(OrderBumps::id.eq(order_bump_id))
            .get_result::<OrderBump>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => order_bump_id)
            })?;
        acl::check(&*self.acl, Resource::OrderBumps, Action::Write, self, Some(&bump))
            .map_err(ectx!(try ErrorKind::Forbidden => order_bump_id))?;
        Ok(bump)
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> OrderBumpsRepo for OrderBumpsRepoImpl<'a, T> {
    fn get(&self, order_bump_id: OrderBumpId) -> RepoResult<Option<OrderBump>> {
        debug!("Getting an order bump with ID: {}", order_bump_id);

        let bump = OrderBumps::order_bumps
            .filter(OrderBumps::id.eq(order_bump_id))
            .get_result::<OrderBump>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => order_bump_id)
            })?;

        if let Some(ref bump) = bump {
            self.check_read(&[bump.clone()])?;
        }

        Ok(bump)
    }

    fn list_by_product(&self, product_id: ProductId, active_only: bool) -> RepoResult<Vec<OrderBump>> {
        debug!("Listing order bumps of product {}, active only: {}", product_id, active_only);

        let mut query = OrderBumps::order_bumps.filter(OrderBumps::product_id.eq(product_id)).into_boxed();
        if active_only {
            query = query.filter(OrderBumps::active.eq(true));
        }

        let bumps = query
            .order(OrderBumps::created_at.asc())
            .get_results::<OrderBump>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => product_id)
            })?;

        self.check_read(&bumps)?;
        Ok(bumps)
    }

    fn list_by_ids(&self, ids: &[OrderBumpId]) -> RepoResult<Vec<OrderBump>> {
        debug!("Listing order bumps with IDs: {:?}", ids);
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let bumps = OrderBumps::order_bumps
            .filter(OrderBumps::id.eq_any(ids.to_vec()))
            .get_results::<OrderBump>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => ids)
            })?;

        self.check_read(&bumps)?;
        Ok(bumps)
    }

    fn create(&self, payload: NewOrderBump) -> RepoResult<OrderBump> {
        debug!("Creating an order bump with ID: {}", payload.id);

        self.db_conn.transaction::<OrderBump, Error, _>(|| {
            let bump = diesel::insert_into(OrderBumps::order_bumps)
                .values(&payload)
                .get_result::<OrderBump>(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => payload)
                })?;
            let order_bump_id = bump.id;
            acl::check(&*self.acl, Resource::OrderBumps, Action::Write, self, Some(&bump))
                .map_err(ectx!(try ErrorKind::Forbidden => order_bump_id))?;
            Ok(bump)
        })
    }

    fn set_active(&self, order_bump_id: OrderBumpId, active: bool) -> RepoResult<OrderBump> {
        debug!("Setting active = {} for order bump with ID: {}", active, order_bump_id);
        self.get_for_write(order_bump_id)?;

        diesel::update(OrderBumps::order_bumps.filter(OrderBumps::id.eq(order_bump_id)))
            .set(OrderBumps::active.eq(active))
            .get_result::<OrderBump>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => order_bump_id, active)
            })
    }

    fn delete(&self, order_bump_id: OrderBumpId) -> RepoResult<OrderBump> {
        debug!("Deleting an order bump with ID: {}", order_bump_id);
        self.get_for_write(order_bump_id)?;

        diesel::delete(OrderBumps::order_bumps.filter(OrderBumps::id.eq(order_bump_id)))
            .get_result::<OrderBump>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => order_bump_id)
            })
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<OrderBump>
    for OrderBumpsRepoImpl<'a, T>
{
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&OrderBump>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => obj.map(|bump| bump.producer_id == user_id).unwrap_or(false),
        }
    }
}
