//! Repo for commissions table. There is at most one commission per order,
//! enforced by a unique index on `order_id`.

use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::dsl::sum;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Fail;

use crate::models::authorization::*;
use crate::models::{
    Amount, Commission, CommissionId, CommissionStatus, CommissionTotals, CommissionsSearch, NewCommission, OrderId, Pagination, UserId,
};
use crate::schema::commissions::dsl as Commissions;

use super::acl::{self, Acl, CheckScope};
use super::error::*;
use super::orders::amount_from_sum;
use super::types::RepoResult;

pub type CommissionsRepoAcl = Box<dyn Acl<Commission>>;

pub trait CommissionsRepo {
    fn get(&self, commission_id: CommissionId) -> RepoResult<Option<Commission>>;

    fn get_by_order(&self, order_id: OrderId) -> RepoResult<Option<Commission>>;

    fn list(&self, search: CommissionsSearch, pagination: Pagination) -> RepoResult<Vec<Commission>>;

    /// Pending and paid sums over every commission matching `search.producer_id`
    fn totals(&self, search: CommissionsSearch) -> RepoResult<CommissionTotals>;

    /// Inserts the commission unless the order already has one.
    /// Returns None if nothing was inserted.
    fn create_if_missing(&self, payload: NewCommission) -> RepoResult<Option<Commission>>;

    /// Moves the commission from `from` to `status`.
    /// Returns None if the commission is missing or no longer has status `from`.
    fn set_status(&self, commission_id: CommissionId, from: CommissionStatus, status: CommissionStatus) -> RepoResult<Option<Commission>>;

    /// Cancels the pending commission of the order, if there is one
    fn cancel_for_order(&self, order_id: OrderId) -> RepoResult<Option<Commission>>;

    fn total_by_status(&self, status: CommissionStatus) -> RepoResult<Amount>;
}

pub struct CommissionsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: CommissionsRepoAcl,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CommissionsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: CommissionsRepoAcl) -> Self {
        Self { db_conn, acl }
    }

    fn sum_by_status(&self, producer_id: Option<UserId>, status: CommissionStatus) -> RepoResult<Amount> {
        let mut query = Commissions::commissions
            .select(sum(Commissions::amount))
            .filter(Commissions::status.eq(status))
            .into_boxed();
        if let Some(producer_id) = producer_id {
            query = query.filter(Commissions::producer_id.eq(producer_id));
        }

        let total = query.get_result::<Option<BigDecimal>>(self.db_conn).map_err(|e| {
            let error_kind = ErrorKind::from(&e);
            ectx!(try err e, ErrorSource::Diesel, error_kind => producer_id, status)
        })?;

        amount_from_sum(total)
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CommissionsRepo for CommissionsRepoImpl<'a, T> {
    fn get(&self, commission_id: CommissionId) -> RepoResult<Option<Commission>> {
        debug!("Getting a commission with ID: {}", commission_id);

        let commission = Commissions::commissions
            .filter(Commissions::id.eq(commission_id))
            .get_result::<Commission>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => commission_id)
            })?;

        if let Some(ref commission) = commission {
            acl::check(&*self.acl, Resource::Commissions, Action::Read, self, Some(commission))
                .map_err(ectx!(try ErrorKind::Forbidden => commission_id))?;
        }

        Ok(commission)
    }

    fn get_by_order(&self, order_id: OrderId) -> RepoResult<Option<Commission>> {
        debug!("Getting a commission of order with ID: {}", order_id);

        let commission = Commissions::commissions
            .filter(Commissions::order_id.eq(order_id))
            .get_result::<Commission>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => order_id)
            })?;

        if let Some(ref commission) = commission {
            acl::check(&*self.acl, Resource::Commissions, Action::Read, self, Some(commission))
                .map_err(ectx!(try ErrorKind::Forbidden => order_id))?;
        }

        Ok(commission)
    }

    fn list(&self, search: CommissionsSearch, pagination: Pagination) -> RepoResult<Vec<Commission>> {
        debug!("Listing commissions by {:?}, {:?}", search, pagination);

        let mut query = Commissions::commissions.into_boxed();
        if let Some(producer_id) = search.producer_id {
            query = query.filter(Commissions::producer_id.eq(producer_id));
        }
        if let Some(status) = search.status {
            query = query.filter(Commissions::status.eq(status));
        }

        let commissions = query
            .order(Commissions::created_at.desc())
            .offset(pagination.skip)
            .limit(pagination.count)
            .get_results::<Commission>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => search)
            })?;

        for commission in &commissions {
            acl::check(&*self.acl, Resource::Commissions, Action::Read, self, Some(commission)).map_err(ectx!(try ErrorKind::Forbidden))?;
        }

        Ok(commissions)
    }

    fn totals(&self, search: CommissionsSearch) -> RepoResult<CommissionTotals> {
        debug!("Summing commissions by {:?}", search);
        acl::check(&*self.acl, Resource::Commissions, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden))?;

        Ok(CommissionTotals {
            total_pending: self.sum_by_status(search.producer_id, CommissionStatus::Pending)?,
            total_paid: self.sum_by_status(search.producer_id, CommissionStatus::Paid)?,
        })
    }

    fn create_if_missing(&self, payload: NewCommission) -> RepoResult<Option<Commission>> {
        debug!("Creating a commission for order with ID: {}", payload.order_id);
        acl::check(&*self.acl, Resource::Commissions, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden))?;

        diesel::insert_into(Commissions::commissions)
            .values(&payload)
            .on_conflict(Commissions::order_id)
            .do_nothing()
            .get_result::<Commission>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => payload)
            })
    }

    fn set_status(&self, commission_id: CommissionId, from: CommissionStatus, status: CommissionStatus) -> RepoResult<Option<Commission>> {
        debug!("Setting status {} -> {} for commission with ID: {}", from, status, commission_id);
        acl::check(&*self.acl, Resource::Commissions, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden => commission_id))?;

        let paid_at = match status {
            CommissionStatus::Paid => Some(Utc::now().naive_utc()),
            _ => None,
        };

        let filter = Commissions::commissions
            .filter(Commissions::id.eq(commission_id))
            .filter(Commissions::status.eq(from));

        diesel::update(filter)
            .set((Commissions::status.eq(status), Commissions::paid_at.eq(paid_at)))
            .get_result::<Commission>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => commission_id, status)
            })
    }

    fn cancel_for_order(&self, order_id: OrderId) -> RepoResult<Option<Commission>> {
        debug!("Cancelling commission of order with ID: {}", order_id);
        acl::check(&*self.acl, Resource::Commissions, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden => order_id))?;

        let filter = Commissions::commissions
            .filter(Commissions::order_id.eq(order_id))
            .filter(Commissions::status.eq(CommissionStatus::Pending));

        diesel::update(filter)
            .set(Commissions::status.eq(CommissionStatus::Cancelled))
            .get_result::<Commission>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => order_id)
            })
    }

    fn total_by_status(&self, status: CommissionStatus) -> RepoResult<Amount> {
        debug!("Summing commissions with status {}", status);
        acl::check(&*self.acl, Resource::Commissions, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden))?;

        let total = Commissions::commissions
            .filter(Commissions::status.eq(status))
            .select(sum(Commissions::amount))
            .get_result::<Option<BigDecimal>>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => status)
            })?;

        amount_from_sum(total)
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<Commission>
    for CommissionsRepoImpl<'a, T>
{
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&Commission>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => obj.map(|commission| commission.producer_id == user_id).unwrap_or(false),
        }
    }
}
