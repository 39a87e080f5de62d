//! Admin dashboard numbers

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use enum_iterator::IntoEnumIterator;
use failure::Fail;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use super::{current_user, require_role, Error, ErrorKind, Service};
use crate::models::*;
use crate::repos::ReposFactory;

pub trait DashboardService {
    fn get_stats(&self) -> ServiceFuture<DashboardStats>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > DashboardService for Service<T, M, F>
{
    fn get_stats(&self) -> ServiceFuture<DashboardStats> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;
            debug!("Collecting dashboard stats for admin {}", admin.id);

            let mut stats = DashboardStats::default();

            let users_repo = repo_factory.create_users_repo(&*conn, user_id);
            for role in Role::into_enum_iter() {
                let count = users_repo.count_by_role(role).map_err(ectx!(try convert => role))?;
                stats.add_users(role, count);
            }

            let orders_repo = repo_factory.create_orders_repo(&*conn, user_id);
            for status in OrderStatus::into_enum_iter() {
                let count = orders_repo.count_by_status(status).map_err(ectx!(try convert => status))?;
                stats.add_orders(status, count);
            }
            let totals = orders_repo.paid_totals().map_err(ectx!(try convert))?;
            stats.gross_revenue = totals.gross;
            stats.platform_fees = totals.platform_fees;

            let commissions_repo = repo_factory.create_commissions_repo(&*conn, user_id);
            stats.pending_commissions = commissions_repo
                .total_by_status(CommissionStatus::Pending)
                .map_err(ectx!(try convert))?;

            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            stats.published_products = products_repo
                .count_by_status(ListingStatus::Published)
                .map_err(ectx!(try convert))?;
            stats.pending_products = products_repo
                .count_by_status(ListingStatus::PendingApproval)
                .map_err(ectx!(try convert))?;

            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio_core::reactor::Core;

    use super::*;
    use crate::repos::repo_factory::tests::*;

    #[test]
    fn test_dashboard_stats() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        repo_factory.add_order(create_pending_order(CheckoutId::generate()));
        let service = create_service_with(Some(admin_id()), repo_factory, Default::default(), Default::default());

        let stats = core.run(service.get_stats()).unwrap();
        assert_eq!(stats.users_by_role["admin"], 1);
        assert_eq!(stats.users_by_role["producer"], 2);
        assert_eq!(stats.users_by_role["buyer"], 3);
        assert_eq!(stats.orders_by_status["pending"], 1);
        assert_eq!(stats.orders_by_status["refunded"], 0);
        assert_eq!(stats.gross_revenue, Amount::new(PRODUCT_PRICE));
        assert_eq!(stats.platform_fees, Amount::new(300));
        assert_eq!(stats.pending_commissions, Amount::zero());
        assert_eq!(stats.published_products, 4);
    }

    #[test]
    fn test_dashboard_is_admin_only() {
        let mut core = Core::new().unwrap();
        let service = create_service(Some(producer_id()));
        assert_eq!(core.run(service.get_stats()).unwrap_err().kind(), ErrorKind::Forbidden);
    }
}
