//! Platform commissions: reports, payouts and reconciliation

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use super::{current_user, require_role, Error, ErrorContext, ErrorKind, Service};
use crate::controller::responses::ReconcileResponse;
use crate::models::*;
use crate::repos::ReposFactory;

pub trait CommissionsService {
    /// Commissions of the current producer with totals
    fn list_mine(&self, pagination: Pagination) -> ServiceFuture<CommissionsReport>;
    fn list_all(&self, search: CommissionsSearch, pagination: Pagination) -> ServiceFuture<CommissionsReport>;
    fn mark_paid(&self, commission_id: CommissionId) -> ServiceFuture<Commission>;
    /// Admin triggered reconciliation
    fn reconcile(&self) -> ServiceFuture<ReconcileResponse>;
    /// Creates commissions missing for paid orders, used by the periodic job
    fn reconcile_missing_commissions(&self) -> ServiceFuture<ReconcileResponse>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > CommissionsService for Service<T, M, F>
{
    fn list_mine(&self, pagination: Pagination) -> ServiceFuture<CommissionsReport> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&user, &[Role::Producer])?;
            debug!("Listing commissions of producer {}", user.id);

            let commissions_repo = repo_factory.create_commissions_repo(&*conn, user_id);
            let search = CommissionsSearch {
                producer_id: Some(user.id),
                ..Default::default()
            };
            let commissions = commissions_repo
                .list(search.clone(), pagination)
                .map_err(ectx!(try convert => user.id))?;
            report(&repo_factory, &*conn, commissions, search)
        })
    }

    fn list_all(&self, search: CommissionsSearch, pagination: Pagination) -> ServiceFuture<CommissionsReport> {
        debug!("Listing commissions with {:?}, {:?}", search, pagination);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;
            let commissions_repo = repo_factory.create_commissions_repo(&*conn, user_id);
            let commissions = commissions_repo.list(search.clone(), pagination).map_err(ectx!(try convert))?;
            report(&repo_factory, &*conn, commissions, search)
        })
    }

    fn mark_paid(&self, commission_id: CommissionId) -> ServiceFuture<Commission> {
        debug!("Marking commission {} as paid", commission_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;

            let commissions_repo = repo_factory.create_commissions_repo(&*conn, user_id);
            let commission = commissions_repo
                .get(commission_id)
                .map_err(ectx!(try convert => commission_id))?
                .ok_or_else(|| {
                    let e = format_err!("Commission {} not found", commission_id);
                    ectx!(try err e, ErrorKind::NotFound => commission_id)
                })?;
            if !commission.status.can_transition_to(CommissionStatus::Paid) {
                let e = format_err!("Commission {} is {}", commission_id, commission.status);
                return Err(ectx!(err e, ErrorContext::CommissionState, ErrorKind::InvalidTransition => commission_id));
            }

            let commission = commissions_repo
                .set_status(commission_id, commission.status, CommissionStatus::Paid)
                .map_err(ectx!(try convert => commission_id))?
                .ok_or_else(|| {
                    let e = format_err!("Commission {} changed before it could be paid", commission_id);
                    ectx!(try err e, ErrorContext::CommissionState, ErrorKind::InvalidTransition => commission_id)
                })?;
            info!("Admin {} marked commission {} as paid", admin.id, commission.id);
            Ok(commission)
        })
    }

    fn reconcile(&self) -> ServiceFuture<ReconcileResponse> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;
        let batch_size = self.static_context.config.reconciler.batch_size;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;
            create_missing_commissions(&repo_factory, &*conn, batch_size)
        })
    }

    fn reconcile_missing_commissions(&self) -> ServiceFuture<ReconcileResponse> {
        let repo_factory = self.static_context.repo_factory.clone();
        let batch_size = self.static_context.config.reconciler.batch_size;

        self.spawn_on_pool(move |conn| create_missing_commissions(&repo_factory, &*conn, batch_size))
    }
}

/// Totals cover every commission of the searched producer, not just the listed page.
/// Callers check the role before calling.
fn report<T, F>(repo_factory: &F, conn: &T, commissions: Vec<Commission>, search: CommissionsSearch) -> Result<CommissionsReport, Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    let commissions_repo = repo_factory.create_commissions_repo_with_sys_acl(conn);
    let totals = commissions_repo.totals(search.clone()).map_err(ectx!(try convert => search))?;
    Ok(CommissionsReport::new(commissions, totals))
}

fn create_missing_commissions<T, F>(repo_factory: &F, conn: &T, batch_size: i64) -> Result<ReconcileResponse, Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    debug!("Looking for paid orders without commission");

    let orders_repo = repo_factory.create_orders_repo_with_sys_acl(conn);
    let commissions_repo = repo_factory.create_commissions_repo_with_sys_acl(conn);
    let orders = orders_repo
        .list_paid_without_commission(batch_size)
        .map_err(ectx!(try convert => batch_size))?;
    let checked_orders = orders.len();

    let created = conn.transaction::<_, Error, _>(|| {
        let mut created = vec![];
        for order in &orders {
            let payload = NewCommission::for_order(order);
            if let Some(commission) = commissions_repo
                .create_if_missing(payload)
                .map_err(ectx!(try convert ErrorContext::CommissionState => order.id))?
            {
                created.push(commission);
            }
        }
        Ok(created)
    })?;

    if !created.is_empty() {
        warn!("Reconciliation created {} missing commissions", created.len());
    }
    Ok(ReconcileResponse { checked_orders, created })
}

#[cfg(test)]
mod tests {
    use tokio_core::reactor::Core;

    use super::*;
    use crate::repos::repo_factory::tests::*;

    fn paid_order(status: OrderStatus) -> Order {
        Order {
            status,
            payment_status: PaymentStatus::Paid,
            ..create_pending_order(CheckoutId::generate())
        }
    }

    #[test]
    fn test_reconcile_creates_missing_commissions_once() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        repo_factory.add_order(paid_order(OrderStatus::Approved));
        repo_factory.add_order(paid_order(OrderStatus::Completed));
        repo_factory.add_order(create_pending_order(CheckoutId::generate()));

        let admin = create_service_with(Some(admin_id()), repo_factory.clone(), Default::default(), Default::default());
        let response = core.run(admin.reconcile()).unwrap();
        assert_eq!(response.checked_orders, 2);
        assert_eq!(response.created.len(), 2);
        assert!(response.created.iter().all(|c| c.amount == Amount::new(300)));

        let job = create_service_with(None, repo_factory.clone(), Default::default(), Default::default());
        let response = core.run(job.reconcile_missing_commissions()).unwrap();
        assert_eq!(response.checked_orders, 0);
        assert_eq!(repo_factory.commissions_count(), 2);

        let producer = create_service_with(Some(producer_id()), repo_factory.clone(), Default::default(), Default::default());
        assert_eq!(core.run(producer.reconcile()).unwrap_err().kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_commission_reports_and_payment() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        repo_factory.add_order(paid_order(OrderStatus::Approved));
        let admin = create_service_with(Some(admin_id()), repo_factory.clone(), Default::default(), Default::default());
        core.run(admin.reconcile()).unwrap();

        let producer = create_service_with(Some(producer_id()), repo_factory.clone(), Default::default(), Default::default());
        let report = core.run(producer.list_mine(Pagination::default())).unwrap();
        assert_eq!(report.commissions.len(), 1);
        assert_eq!(report.total_pending, Amount::new(300));
        assert_eq!(report.total_paid, Amount::zero());

        let commission_id = report.commissions[0].id;
        assert_eq!(core.run(producer.mark_paid(commission_id)).unwrap_err().kind(), ErrorKind::Forbidden);
        let paid = core.run(admin.mark_paid(commission_id)).unwrap();
        assert_eq!(paid.status, CommissionStatus::Paid);
        assert!(paid.paid_at.is_some());
        assert_eq!(core.run(admin.mark_paid(commission_id)).unwrap_err().kind(), ErrorKind::InvalidTransition);
        assert_eq!(core.run(admin.mark_paid(CommissionId::generate())).unwrap_err().kind(), ErrorKind::NotFound);

        let report = core.run(admin.list_all(CommissionsSearch::default(), Pagination::default())).unwrap();
        assert_eq!(report.total_paid, Amount::new(300));

        let buyer = create_service_with(Some(buyer_id()), repo_factory, Default::default(), Default::default());
        assert_eq!(core.run(buyer.list_mine(Pagination::default())).unwrap_err().kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_report_totals_cover_all_pages() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        for n in 0..(DEFAULT_PAGE_SIZE + 5) {
            let order = paid_order(OrderStatus::Approved);
            let status = if n % 5 == 0 { CommissionStatus::Paid } else { CommissionStatus::Pending };
            repo_factory.add_commission(Commission {
                status,
                ..create_commission(&order)
            });
        }
        let foreign = Order {
            producer_id: other_producer_id(),
            ..paid_order(OrderStatus::Approved)
        };
        repo_factory.add_commission(create_commission(&foreign));

        let producer = create_service_with(Some(producer_id()), repo_factory.clone(), Default::default(), Default::default());
        let report = core.run(producer.list_mine(Pagination::default())).unwrap();
        assert_eq!(report.commissions.len(), DEFAULT_PAGE_SIZE as usize);
        assert_eq!(report.total_pending, Amount::new(20 * 300));
        assert_eq!(report.total_paid, Amount::new(5 * 300));

        let admin = create_service_with(Some(admin_id()), repo_factory, Default::default(), Default::default());
        let page = Pagination { skip: 20, count: 20 };
        let report = core.run(admin.list_all(CommissionsSearch::default(), page)).unwrap();
        assert_eq!(report.commissions.len(), 6);
        assert_eq!(report.total_pending, Amount::new(21 * 300));
        assert_eq!(report.total_paid, Amount::new(5 * 300));
    }

    #[test]
    fn test_reconciled_commission_keeps_order_rate() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let order = Order {
            platform_fee: Amount::new(500),
            producer_amount: Amount::new(9_500),
            rate_bps: 500,
            ..paid_order(OrderStatus::Approved)
        };
        repo_factory.add_order(order.clone());

        let job = create_service_with(None, repo_factory.clone(), Default::default(), Default::default());
        core.run(job.reconcile_missing_commissions()).unwrap();
        let commission = repo_factory.commission(order.id).unwrap();
        assert_eq!(commission.rate_bps, 500);
        assert_eq!(commission.amount, Amount::new(500));
    }
}
