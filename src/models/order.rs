use chrono::NaiveDateTime;
use diesel::sql_types::VarChar;
use enum_iterator::IntoEnumIterator;

use crate::models::{Amount, ComboId, CommissionSplit, OrderBumpId, ProductId, UserId};
use crate::schema::orders;

uuid_id!(OrderId, order_id_sql);
uuid_id!(
    /// Groups the orders created by one purchase, used as the payment external reference
    CheckoutId,
    checkout_id_sql
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression, IntoEnumIterator)]
#[sql_type = "VarChar"]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Approved,
    Completed,
    Cancelled,
    Refunded,
}

derive_varchar_enum!(OrderStatus, ParseOrderStatusError, {
    Pending => "pending",
    Approved => "approved",
    Completed => "completed",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl OrderStatus {
    /// Same status is accepted so that repeated webhooks are no-ops
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if self == next {
            return true;
        }

        match (self, next) {
            (OrderStatus::Pending, OrderStatus::Approved) => true,
            (OrderStatus::Pending, OrderStatus::Cancelled) => true,
            (OrderStatus::Approved, OrderStatus::Completed) => true,
            (OrderStatus::Approved, OrderStatus::Refunded) => true,
            (OrderStatus::Completed, OrderStatus::Refunded) => true,
            _ => false,
        }
    }

    /// Orders in these statuses must have a commission
    pub fn is_paid(self) -> bool {
        match self {
            OrderStatus::Approved | OrderStatus::Completed => true,
            _ => false,
        }
    }

    pub fn paid_statuses() -> Vec<OrderStatus> {
        vec![OrderStatus::Approved, OrderStatus::Completed]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression)]
#[sql_type = "VarChar"]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

derive_varchar_enum!(PaymentStatus, ParsePaymentStatusError, {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

impl From<OrderStatus> for PaymentStatus {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => PaymentStatus::Pending,
            OrderStatus::Approved | OrderStatus::Completed => PaymentStatus::Paid,
            OrderStatus::Cancelled => PaymentStatus::Failed,
            OrderStatus::Refunded => PaymentStatus::Refunded,
        }
    }
}

#[derive(Clone, Debug, Serialize, Queryable)]
pub struct Order {
    pub id: OrderId,
    pub checkout_id: CheckoutId,
    pub buyer_id: UserId,
    pub producer_id: UserId,
    pub product_id: Option<ProductId>,
    pub combo_id: Option<ComboId>,
    pub order_bump_id: Option<OrderBumpId>,
    pub amount: Amount,
    pub platform_fee: Amount,
    pub producer_amount: Amount,
    /// Commission rate the fee was computed with
    pub rate_bps: i32,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// What an order was placed for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderItem {
    Product(ProductId),
    Combo(ComboId),
    Bump { bump_id: OrderBumpId, product_id: ProductId },
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "orders"]
pub struct NewOrder {
    pub id: OrderId,
    pub checkout_id: CheckoutId,
    pub buyer_id: UserId,
    pub producer_id: UserId,
    pub product_id: Option<ProductId>,
    pub combo_id: Option<ComboId>,
    pub order_bump_id: Option<OrderBumpId>,
    pub amount: Amount,
    pub platform_fee: Amount,
    pub producer_amount: Amount,
    pub rate_bps: i32,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

impl NewOrder {
    /// New pending order with the fee split already applied
    pub fn new(checkout_id: CheckoutId, buyer_id: UserId, producer_id: UserId, item: OrderItem, amount: Amount, split: CommissionSplit) -> Self {
        let (product_id, combo_id, order_bump_id) = match item {
            OrderItem::Product(product_id) => (Some(product_id), None, None),
            OrderItem::Combo(combo_id) => (None, Some(combo_id), None),
            OrderItem::Bump { bump_id, product_id } => (Some(product_id), None, Some(bump_id)),
        };

        NewOrder {
            id: OrderId::generate(),
            checkout_id,
            buyer_id,
            producer_id,
            product_id,
            combo_id,
            order_bump_id,
            amount,
            platform_fee: split.platform_fee,
            producer_amount: split.producer_amount,
            rate_bps: split.rate_bps as i32,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OrdersSearch {
    pub buyer_id: Option<UserId>,
    pub producer_id: Option<UserId>,
    pub checkout_id: Option<CheckoutId>,
    pub status: Option<OrderStatus>,
}

impl OrdersSearch {
    pub fn by_buyer(buyer_id: UserId) -> Self {
        OrdersSearch {
            buyer_id: Some(buyer_id),
            ..Default::default()
        }
    }

    pub fn by_producer(producer_id: UserId) -> Self {
        OrdersSearch {
            producer_id: Some(producer_id),
            ..Default::default()
        }
    }

    pub fn by_checkout(checkout_id: CheckoutId) -> Self {
        OrdersSearch {
            checkout_id: Some(checkout_id),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Approved,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    #[test]
    fn test_order_transitions() {
        let allowed = [
            (OrderStatus::Pending, OrderStatus::Approved),
            (OrderStatus::Pending, OrderStatus::Cancelled),
            (OrderStatus::Approved, OrderStatus::Completed),
            (OrderStatus::Approved, OrderStatus::Refunded),
            (OrderStatus::Completed, OrderStatus::Refunded),
        ];

        for from in ALL.iter() {
            for to in ALL.iter() {
                let expected = from == to || allowed.contains(&(*from, *to));
                assert_eq!(from.can_transition_to(*to), expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_terminal_statuses() {
        for to in ALL.iter().filter(|s| **s != OrderStatus::Cancelled) {
            assert!(!OrderStatus::Cancelled.can_transition_to(*to));
        }
        for to in ALL.iter().filter(|s| **s != OrderStatus::Refunded) {
            assert!(!OrderStatus::Refunded.can_transition_to(*to));
        }
    }

    #[test]
    fn test_new_order_keeps_split() {
        let split = CommissionSplit::calculate(Amount::new(4_990), 300).unwrap();
        let order = NewOrder::new(
            CheckoutId::generate(),
            UserId::generate(),
            UserId::generate(),
            OrderItem::Product(ProductId::generate()),
            Amount::new(4_990),
            split,
        );
        assert_eq!(order.platform_fee, Amount::new(150));
        assert_eq!(order.producer_amount, Amount::new(4_840));
        assert_eq!(order.rate_bps, 300);
        assert_eq!(order.platform_fee.checked_add(order.producer_amount), Some(order.amount));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.combo_id.is_none());
    }

    #[test]
    fn test_payment_status_from_order_status() {
        assert_eq!(PaymentStatus::from(OrderStatus::Approved), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::from(OrderStatus::Cancelled), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from(OrderStatus::Refunded), PaymentStatus::Refunded);
    }
}
