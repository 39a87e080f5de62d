//! Response bodies that are not plain models

use crate::models::*;

/// Result of a checkout: the created orders and where to pay for them
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub checkout_id: CheckoutId,
    pub orders: Vec<Order>,
    pub total: Amount,
    pub payment_url: String,
}

/// Commissions created by a reconciliation run
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResponse {
    pub checked_orders: usize,
    pub created: Vec<Commission>,
}

/// Order bump with the product it offers
#[derive(Debug, Clone, Serialize)]
pub struct OrderBumpResponse {
    #[serde(flatten)]
    pub order_bump: OrderBump,
    pub offer: Product,
}

/// Acknowledgement for requests without a meaningful body
#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

impl Default for AckResponse {
    fn default() -> Self {
        AckResponse { ok: true }
    }
}
