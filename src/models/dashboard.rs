use std::collections::HashMap;

use crate::models::{Amount, OrderStatus, Role};

/// Aggregated numbers for the admin dashboard
#[derive(Clone, Debug, Default, Serialize)]
pub struct DashboardStats {
    pub users_by_role: HashMap<String, i64>,
    pub orders_by_status: HashMap<String, i64>,
    pub gross_revenue: Amount,
    pub platform_fees: Amount,
    pub pending_commissions: Amount,
    pub published_products: i64,
    pub pending_products: i64,
}

impl DashboardStats {
    pub fn add_users(&mut self, role: Role, count: i64) {
        *self.users_by_role.entry(role.to_string()).or_insert(0) += count;
    }

    pub fn add_orders(&mut self, status: OrderStatus, count: i64) {
        *self.orders_by_status.entry(status.to_string()).or_insert(0) += count;
    }
}
