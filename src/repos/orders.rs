//! Repo for orders table

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::Utc;
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::dsl::{exists, sum};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::select;
use diesel::Connection;
use failure::Fail;

use crate::models::authorization::*;
use crate::models::{Amount, CheckoutId, NewOrder, Order, OrderId, OrderStatus, OrdersSearch, Pagination, PaymentStatus, ProductId, UserId};
use crate::schema::combo_products::dsl as ComboProducts;
use crate::schema::commissions::dsl as Commissions;
use crate::schema::orders;
use crate::schema::orders::dsl as Orders;

use super::acl::{self, Acl, CheckScope};
use super::error::*;
use super::types::RepoResult;

pub type OrdersRepoAcl = Box<dyn Acl<Order>>;

/// Sums over approved and completed orders
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OrderTotals {
    pub gross: Amount,
    pub platform_fees: Amount,
}

pub trait OrdersRepo {
    fn get(&self, order_id: OrderId) -> RepoResult<Option<Order>>;

    fn list(&self, search: OrdersSearch, pagination: Pagination) -> RepoResult<Vec<Order>>;

    /// Every order of a checkout, unpaginated
    fn list_by_checkout(&self, checkout_id: CheckoutId) -> RepoResult<Vec<Order>>;

    /// Creates all orders of one checkout
    fn create_many(&self, payload: Vec<NewOrder>) -> RepoResult<Vec<Order>>;

    /// Moves the order from `from` to `status` in a single conditional update.
    /// Returns None if the order is no longer in `from`.
    fn update_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        status: OrderStatus,
        payment_status: PaymentStatus,
        payment_id: Option<String>,
    ) -> RepoResult<Option<Order>>;

    /// Approved or completed orders that have no commission row
    fn list_paid_without_commission(&self, limit: i64) -> RepoResult<Vec<Order>>;

    /// Tells if the buyer has a paid order for the product, directly or in a combo
    fn has_purchased(&self, buyer_id: UserId, product_id: ProductId) -> RepoResult<bool>;

    fn purchased_product_ids(&self, buyer_id: UserId) -> RepoResult<Vec<ProductId>>;

    fn count_by_status(&self, status: OrderStatus) -> RepoResult<i64>;

    fn paid_totals(&self) -> RepoResult<OrderTotals>;
}

pub struct OrdersRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: OrdersRepoAcl,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> OrdersRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: OrdersRepoAcl) -> Self {
        Self { db_conn, acl }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> OrdersRepo for OrdersRepoImpl<'a, T> {
    fn get(&self, order_id: OrderId) -> RepoResult<Option<Order>> {
        debug!("Getting an order with ID: {}", order_id);

        let order = Orders::orders
            .filter(Orders::id.eq(order_id))
            .get_result::<Order>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => order_id)
            })?;

        if let Some(ref order) = order {
            acl::check(&*self.acl, Resource::Orders, Action::Read, self, Some(order)).map_err(ectx!(try ErrorKind::Forbidden => order_id))?;
        }

        Ok(order)
    }

    fn list(&self, search: OrdersSearch, pagination: Pagination) -> RepoResult<Vec<Order>> {
        debug!("Listing orders by {:?}, {:?}", search, pagination);

        let mut query = Orders::orders.into_boxed();
        if let Some(buyer_id) = search.buyer_id {
            query = query.filter(Orders::buyer_id.eq(buyer_id));
        }
        if let Some(producer_id) = search.producer_id {
            query = query.filter(Orders::producer_id.eq(producer_id));
        }
        if let Some(checkout_id) = search.checkout_id {
            query = query.filter(Orders::checkout_id.eq(checkout_id));
        }
        if let Some(status) = search.status {
            query = query.filter(Orders::status.eq(status));
        }

        let orders = query
            .order(Orders::created_at.desc())
            .offset(pagination.skip)
            .limit(pagination.count)
            .get_results::<Order>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => search)
            })?;

        for order in &orders {
            acl::check(&*self.acl, Resource::Orders, Action::Read, self, Some(order)).map_err(ectx!(try ErrorKind::Forbidden))?;
        }

        Ok(orders)
    }

    fn list_by_checkout(&self, checkout_id: CheckoutId) -> RepoResult<Vec<Order>> {
        debug!("Listing orders of checkout {}", checkout_id);

        let orders = Orders::orders
            .filter(Orders::checkout_id.eq(checkout_id))
            .order(Orders::created_at.asc())
            .get_results::<Order>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => checkout_id)
            })?;

        for order in &orders {
            acl::check(&*self.acl, Resource::Orders, Action::Read, self, Some(order)).map_err(ectx!(try ErrorKind::Forbidden => checkout_id))?;
        }

        Ok(orders)
    }

    fn create_many(&self, payload: Vec<NewOrder>) -> RepoResult<Vec<Order>> {
        debug!("Creating {} orders", payload.len());

        self.db_conn.transaction::<Vec<Order>, Error, _>(|| {
            let orders = diesel::insert_into(Orders::orders)
                .values(&payload)
                .get_results::<Order>(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => payload)
                })?;

            for order in &orders {
                let order_id = order.id;
                acl::check(&*self.acl, Resource::Orders, Action::Write, self, Some(order))
                    .map_err(ectx!(try ErrorKind::Forbidden => order_id))?;
            }

            Ok(orders)
        })
    }

    fn update_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        status: OrderStatus,
        payment_status: PaymentStatus,
        payment_id: Option<String>,
    ) -> RepoResult<Option<Order>> {
        debug!("Moving order with ID: {} from {} to {}", order_id, from, status);
        acl::check(&*self.acl, Resource::Orders, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden => order_id))?;

        let now = Utc::now().naive_utc();
        let filter = Orders::orders.filter(Orders::id.eq(order_id)).filter(Orders::status.eq(from));
        let result = match payment_id {
            Some(ref payment_id) => diesel::update(filter)
                .set((
                    Orders::status.eq(status),
                    Orders::payment_status.eq(payment_status),
                    Orders::payment_id.eq(Some(payment_id.clone())),
                    Orders::updated_at.eq(now),
                ))
                .get_result::<Order>(self.db_conn)
                .optional(),
            None => diesel::update(filter)
                .set((
                    Orders::status.eq(status),
                    Orders::payment_status.eq(payment_status),
                    Orders::updated_at.eq(now),
                ))
                .get_result::<Order>(self.db_conn)
                .optional(),
        };

        result.map_err(|e| {
            let error_kind = ErrorKind::from(&e);
            ectx!(err e, ErrorSource::Diesel, error_kind => order_id, from, status, payment_status, payment_id)
        })
    }

    fn list_paid_without_commission(&self, limit: i64) -> RepoResult<Vec<Order>> {
        debug!("Listing paid orders without commission, limit {}", limit);
        acl::check(&*self.acl, Resource::Orders, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden))?;

        Orders::orders
            .left_join(Commissions::commissions)
            .filter(Orders::status.eq_any(OrderStatus::paid_statuses()))
            .filter(Commissions::id.is_null())
            .select(orders::all_columns)
            .order(Orders::created_at.asc())
            .limit(limit)
            .get_results::<Order>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => limit)
            })
    }

    fn has_purchased(&self, buyer_id: UserId, product_id: ProductId) -> RepoResult<bool> {
        debug!("Checking if user {} has purchased product {}", buyer_id, product_id);

        let combos_with_product = ComboProducts::combo_products
            .filter(ComboProducts::product_id.eq(product_id))
            .select(ComboProducts::combo_id.nullable());

        select(exists(
            Orders::orders
                .filter(Orders::buyer_id.eq(buyer_id))
                .filter(Orders::status.eq_any(OrderStatus::paid_statuses()))
                .filter(Orders::product_id.eq(product_id).or(Orders::combo_id.eq_any(combos_with_product))),
        ))
        .get_result::<bool>(self.db_conn)
        .map_err(|e| {
            let error_kind = ErrorKind::from(&e);
            ectx!(err e, ErrorSource::Diesel, error_kind => buyer_id, product_id)
        })
    }

    fn purchased_product_ids(&self, buyer_id: UserId) -> RepoResult<Vec<ProductId>> {
        debug!("Listing products purchased by user {}", buyer_id);

        let paid_orders = Orders::orders
            .filter(Orders::buyer_id.eq(buyer_id))
            .filter(Orders::status.eq_any(OrderStatus::paid_statuses()));

        let mut product_ids = paid_orders
            .clone()
            .select(Orders::product_id)
            .get_results::<Option<ProductId>>(self.db_conn)
            .map(|ids| ids.into_iter().filter_map(|id| id).collect::<Vec<_>>())
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => buyer_id)
            })?;

        let from_combos = ComboProducts::combo_products
            .filter(ComboProducts::combo_id.nullable().eq_any(paid_orders.select(Orders::combo_id)))
            .select(ComboProducts::product_id)
            .get_results::<ProductId>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => buyer_id)
            })?;

        for product_id in from_combos {
            if !product_ids.contains(&product_id) {
                product_ids.push(product_id);
            }
        }
        Ok(product_ids)
    }

    fn count_by_status(&self, status: OrderStatus) -> RepoResult<i64> {
        debug!("Counting orders with status {}", status);
        acl::check(&*self.acl, Resource::Orders, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden))?;

        Orders::orders
            .filter(Orders::status.eq(status))
            .count()
            .get_result(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => status)
            })
    }

    fn paid_totals(&self) -> RepoResult<OrderTotals> {
        debug!("Summing paid orders");
        acl::check(&*self.acl, Resource::Orders, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden))?;

        let (gross, platform_fees) = Orders::orders
            .filter(Orders::status.eq_any(OrderStatus::paid_statuses()))
            .select((sum(Orders::amount), sum(Orders::platform_fee)))
            .get_result::<(Option<BigDecimal>, Option<BigDecimal>)>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind)
            })?;

        Ok(OrderTotals {
            gross: amount_from_sum(gross)?,
            platform_fees: amount_from_sum(platform_fees)?,
        })
    }
}

/// `SUM` over a BIGINT column comes back as NUMERIC
pub fn amount_from_sum(value: Option<BigDecimal>) -> RepoResult<Amount> {
    match value {
        None => Ok(Amount::zero()),
        Some(value) => value
            .to_u64()
            .map(Amount::new)
            .ok_or_else(|| ectx!(err ErrorContext::AmountOverflow, ErrorKind::Internal => value)),
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<Order> for OrdersRepoImpl<'a, T> {
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&Order>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => obj.map(|order| order.buyer_id == user_id || order.producer_id == user_id).unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_amount_from_sum() {
        assert_eq!(amount_from_sum(None).unwrap(), Amount::zero());
        assert_eq!(amount_from_sum(Some(BigDecimal::from_str("15990").unwrap())).unwrap(), Amount::new(15_990));
        assert!(amount_from_sum(Some(BigDecimal::from_str("-1").unwrap())).is_err());
    }
}
