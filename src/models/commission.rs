use chrono::NaiveDateTime;
use diesel::sql_types::VarChar;

use crate::models::{Amount, Order, OrderId, UserId};
use crate::schema::commissions;

uuid_id!(CommissionId, commission_id_sql);

/// Platform rate applied when the config does not override it, 3%
pub const DEFAULT_COMMISSION_RATE_BPS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression)]
#[sql_type = "VarChar"]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Paid,
    Cancelled,
}

derive_varchar_enum!(CommissionStatus, ParseCommissionStatusError, {
    Pending => "pending",
    Paid => "paid",
    Cancelled => "cancelled",
});

impl CommissionStatus {
    pub fn can_transition_to(self, next: CommissionStatus) -> bool {
        match (self, next) {
            (CommissionStatus::Pending, CommissionStatus::Paid) => true,
            (CommissionStatus::Pending, CommissionStatus::Cancelled) => true,
            _ => false,
        }
    }
}

/// Split of an order amount between the platform and the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommissionSplit {
    pub platform_fee: Amount,
    pub producer_amount: Amount,
    pub rate_bps: u32,
}

impl CommissionSplit {
    /// Returns None if the rate is above 100%
    pub fn calculate(amount: Amount, rate_bps: u32) -> Option<Self> {
        let platform_fee = amount.percent_bps(rate_bps)?;
        let producer_amount = amount.checked_sub(platform_fee)?;
        Some(CommissionSplit {
            platform_fee,
            producer_amount,
            rate_bps,
        })
    }
}

#[derive(Clone, Debug, Serialize, Queryable)]
pub struct Commission {
    pub id: CommissionId,
    pub order_id: OrderId,
    pub producer_id: UserId,
    pub amount: Amount,
    pub rate_bps: i32,
    pub status: CommissionStatus,
    pub created_at: NaiveDateTime,
    pub paid_at: Option<NaiveDateTime>,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "commissions"]
pub struct NewCommission {
    pub id: CommissionId,
    pub order_id: OrderId,
    pub producer_id: UserId,
    pub amount: Amount,
    pub rate_bps: i32,
    pub status: CommissionStatus,
}

impl NewCommission {
    /// Pending commission for the platform fee of a paid order, at the rate the order was placed with
    pub fn for_order(order: &Order) -> Self {
        NewCommission {
            id: CommissionId::generate(),
            order_id: order.id,
            producer_id: order.producer_id,
            amount: order.platform_fee,
            rate_bps: order.rate_bps,
            status: CommissionStatus::Pending,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CommissionsSearch {
    pub producer_id: Option<UserId>,
    pub status: Option<CommissionStatus>,
}

/// Sums over every commission matching a search, not just one page
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CommissionTotals {
    pub total_pending: Amount,
    pub total_paid: Amount,
}

/// One page of commissions with the totals of the whole listing
#[derive(Clone, Debug, Serialize)]
pub struct CommissionsReport {
    pub commissions: Vec<Commission>,
    pub total_pending: Amount,
    pub total_paid: Amount,
}

impl CommissionsReport {
    pub fn new(commissions: Vec<Commission>, totals: CommissionTotals) -> Self {
        CommissionsReport {
            commissions,
            total_pending: totals.total_pending,
            total_paid: totals.total_paid,
        }
    }
}
