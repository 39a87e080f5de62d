//! Orders of buyers and producers, payment notifications and admin order workflow

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use futures::{future, Future};
use r2d2::ManageConnection;

use super::gamification::apply_events_logged;
use super::types::ServiceFuture;
use super::{current_user, require_role, Error, ErrorContext, ErrorKind, Service};
use crate::client::email::Email;
use crate::client::mercado_pago::{MercadoPagoClient, Notification};
use crate::controller::responses::AckResponse;
use crate::models::*;
use crate::repos::ReposFactory;

pub trait OrdersService {
    /// Purchases of the current user
    fn list_mine(&self, pagination: Pagination) -> ServiceFuture<Vec<Order>>;
    /// Order visible to its buyer, its producer and admins
    fn get(&self, order_id: OrderId) -> ServiceFuture<Order>;
    /// Sales of the current producer
    fn list_sales(&self, pagination: Pagination) -> ServiceFuture<Vec<Order>>;
    fn list_all(&self, search: OrdersSearch, pagination: Pagination) -> ServiceFuture<Vec<Order>>;
    fn approve(&self, order_id: OrderId) -> ServiceFuture<Order>;
    fn complete(&self, order_id: OrderId) -> ServiceFuture<Order>;
    fn refund(&self, order_id: OrderId) -> ServiceFuture<Order>;
    fn cancel(&self, order_id: OrderId) -> ServiceFuture<Order>;
    /// Applies the status of a notified payment to the orders of its checkout
    fn handle_notification(&self, notification: Notification) -> ServiceFuture<AckResponse>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > OrdersService for Service<T, M, F>
{
    fn list_mine(&self, pagination: Pagination) -> ServiceFuture<Vec<Order>> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Listing orders of buyer {}", user.id);
            let orders_repo = repo_factory.create_orders_repo(&*conn, user_id);
            orders_repo
                .list(OrdersSearch::by_buyer(user.id), pagination)
                .map_err(ectx!(convert => user.id))
        })
    }

    fn get(&self, order_id: OrderId) -> ServiceFuture<Order> {
        debug!("Getting order {}", order_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            let orders_repo = repo_factory.create_orders_repo(&*conn, user_id);
            let order = orders_repo
                .get(order_id)
                .map_err(ectx!(try convert => order_id))?
                .ok_or_else(|| not_found(order_id))?;
            if user.role == Role::Admin || order.buyer_id == user.id || order.producer_id == user.id {
                Ok(order)
            } else {
                let e = format_err!("Order {} belongs to other users", order_id);
                Err(ectx!(err e, ErrorKind::Forbidden => order_id, user.id))
            }
        })
    }

    fn list_sales(&self, pagination: Pagination) -> ServiceFuture<Vec<Order>> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&user, &[Role::Producer])?;
            debug!("Listing sales of producer {}", user.id);
            let orders_repo = repo_factory.create_orders_repo(&*conn, user_id);
            orders_repo
                .list(OrdersSearch::by_producer(user.id), pagination)
                .map_err(ectx!(convert => user.id))
        })
    }

    fn list_all(&self, search: OrdersSearch, pagination: Pagination) -> ServiceFuture<Vec<Order>> {
        debug!("Listing orders with {:?}, {:?}", search, pagination);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;
            let orders_repo = repo_factory.create_orders_repo(&*conn, user_id);
            orders_repo.list(search, pagination).map_err(ectx!(convert))
        })
    }

    fn approve(&self, order_id: OrderId) -> ServiceFuture<Order> {
        self.transition_order(order_id, OrderStatus::Approved)
    }

    fn complete(&self, order_id: OrderId) -> ServiceFuture<Order> {
        self.transition_order(order_id, OrderStatus::Completed)
    }

    fn refund(&self, order_id: OrderId) -> ServiceFuture<Order> {
        self.transition_order(order_id, OrderStatus::Refunded)
    }

    fn cancel(&self, order_id: OrderId) -> ServiceFuture<Order> {
        self.transition_order(order_id, OrderStatus::Cancelled)
    }

    fn handle_notification(&self, notification: Notification) -> ServiceFuture<AckResponse> {
        let payment_id = match notification.payment_id() {
            Some(payment_id) => payment_id,
            None => {
                debug!("Ignoring notification {:?}", notification);
                return Box::new(future::ok(AckResponse::default()));
            }
        };
        debug!("Received notification for payment {}", payment_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let db_pool = self.static_context.db_pool.clone();
        let cpu_pool = self.static_context.cpu_pool.clone();
        let payment_id_cloned = payment_id.clone();

        let fut = self
            .static_context
            .payments_client
            .get_payment(payment_id.clone())
            .map_err(ectx!(try convert ErrorContext::PaymentNotification => payment_id_cloned))
            .and_then(move |payment| {
                super::types::spawn_on_pool(db_pool, cpu_pool, move |conn| {
                    let next = match payment.order_status() {
                        Some(next) => next,
                        None => {
                            debug!("Payment {} is {}, nothing to apply", payment_id, payment.status);
                            return Ok(vec![]);
                        }
                    };
                    let checkout_id = match payment.checkout_id() {
                        Some(checkout_id) => checkout_id,
                        None => {
                            warn!("Payment {} has unknown external reference {:?}", payment_id, payment.external_reference);
                            return Ok(vec![]);
                        }
                    };

                    let orders_repo = repo_factory.create_orders_repo_with_sys_acl(&*conn);
                    let orders = orders_repo
                        .list_by_checkout(checkout_id)
                        .map_err(ectx!(try convert ErrorContext::PaymentNotification => checkout_id))?;
                    if orders.is_empty() {
                        warn!("Payment {} refers to checkout {} without orders", payment_id, checkout_id);
                    }

                    let mut changed = vec![];
                    for order in orders {
                        if !order.status.can_transition_to(next) {
                            debug!("Order {} is {}, skipping {}", order.id, order.status, next);
                            continue;
                        }
                        if let Some(order) = apply_status(&repo_factory, &*conn, &order, next, Some(payment_id.clone()))? {
                            changed.push(order);
                        }
                    }
                    info!("Payment {} moved {} orders of checkout {} to {}", payment_id, changed.len(), checkout_id, next);

                    after_commit(&repo_factory, &*conn, changed)
                })
            });

        Box::new(
            self.notify_after(Box::new(fut), |emails: &Vec<Email>| emails.first().cloned())
                .map(|_| AckResponse::default()),
        )
    }
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Service<T, M, F>
{
    /// Admin move of a single order
    fn transition_order(&self, order_id: OrderId, next: OrderStatus) -> ServiceFuture<Order> {
        debug!("Moving order {} to {}", order_id, next);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        let fut = self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;

            let orders_repo = repo_factory.create_orders_repo(&*conn, user_id);
            let order = orders_repo
                .get(order_id)
                .map_err(ectx!(try convert => order_id))?
                .ok_or_else(|| not_found(order_id))?;
            if !order.status.can_transition_to(next) {
                let e = format_err!("Order {} cannot go from {} to {}", order_id, order.status, next);
                return Err(ectx!(err e, ErrorContext::OrderState, ErrorKind::InvalidTransition => order_id));
            }
            if order.status == next {
                return Ok((order, None));
            }

            match apply_status(&repo_factory, &*conn, &order, next, None)? {
                Some(updated) => {
                    info!("Admin {} moved order {} to {}", admin.id, order_id, next);
                    let email = after_commit(&repo_factory, &*conn, vec![updated.clone()])?.into_iter().next();
                    Ok((updated, email))
                }
                None => {
                    let e = format_err!("Order {} left {} before it could move to {}", order_id, order.status, next);
                    Err(ectx!(err e, ErrorContext::OrderState, ErrorKind::InvalidTransition => order_id))
                }
            }
        });

        Box::new(
            self.notify_after(fut, |(_, email): &(Order, Option<Email>)| email.clone())
                .map(|(order, _)| order),
        )
    }
}

fn not_found(order_id: OrderId) -> Error {
    let e = format_err!("Order {} not found", order_id);
    ectx!(err e, ErrorKind::NotFound => order_id)
}

/// Moves `order` to `next` together with its commission in one transaction.
/// The move only applies if the stored order still has the status of `order`.
/// Returns None when the order already has status `next` or was moved by someone else meanwhile.
pub fn apply_status<T, F>(
    repo_factory: &F,
    conn: &T,
    order: &Order,
    next: OrderStatus,
    payment_id: Option<String>,
) -> Result<Option<Order>, Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    if order.status == next {
        return Ok(None);
    }

    let orders_repo = repo_factory.create_orders_repo_with_sys_acl(conn);
    let commissions_repo = repo_factory.create_commissions_repo_with_sys_acl(conn);
    let order_id = order.id;
    let from = order.status;

    conn.transaction::<_, Error, _>(move || {
        let updated = orders_repo
            .update_status(order_id, from, next, PaymentStatus::from(next), payment_id)
            .map_err(ectx!(try convert ErrorContext::OrderState => order_id, next))?;
        let updated = match updated {
            Some(updated) => updated,
            None => {
                debug!("Order {} is no longer {}, {} not applied", order_id, from, next);
                return Ok(None);
            }
        };

        if next.is_paid() {
            let created = commissions_repo
                .create_if_missing(NewCommission::for_order(&updated))
                .map_err(ectx!(try convert ErrorContext::CommissionState => order_id))?;
            if let Some(commission) = created {
                info!("Commission {} of {} created for order {}", commission.id, commission.amount, order_id);
            }
        } else if next == OrderStatus::Refunded {
            let cancelled = commissions_repo
                .cancel_for_order(order_id)
                .map_err(ectx!(try convert ErrorContext::CommissionState => order_id))?;
            if let Some(commission) = cancelled {
                info!("Commission {} cancelled after refund of order {}", commission.id, order_id);
            }
        }

        Ok(Some(updated))
    })
}

/// Gamification and receipts for orders that changed status. Runs after the commit and never fails the orders.
fn after_commit<T, F>(repo_factory: &F, conn: &T, orders: Vec<Order>) -> Result<Vec<Email>, Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    let approved = orders
        .into_iter()
        .filter(|order| order.status == OrderStatus::Approved)
        .collect::<Vec<_>>();
    if approved.is_empty() {
        return Ok(vec![]);
    }

    let events = approved
        .iter()
        .flat_map(|order| {
            vec![
                GamificationEvent::Purchase {
                    buyer_id: order.buyer_id,
                    amount: order.amount,
                },
                GamificationEvent::Sale {
                    producer_id: order.producer_id,
                },
            ]
        })
        .collect::<Vec<_>>();
    apply_events_logged(repo_factory, conn, &events);

    let buyer_id = approved[0].buyer_id;
    let users_repo = repo_factory.create_users_repo_with_sys_acl(conn);
    match users_repo.get(buyer_id) {
        Ok(Some(buyer)) => Ok(vec![receipt_email(&buyer, &approved)]),
        Ok(None) => Ok(vec![]),
        Err(e) => {
            error!("Failed to load buyer {} for a receipt: {}", buyer_id, e);
            Ok(vec![])
        }
    }
}

fn receipt_email(buyer: &User, orders: &[Order]) -> Email {
    let total = Amount::checked_sum(orders.iter().map(|order| order.amount)).unwrap_or_default();
    let lines = orders
        .iter()
        .map(|order| format!("- order {}: R$ {}", order.id, order.amount.to_reais()))
        .collect::<Vec<_>>()
        .join("\n");
    let text = format!(
        "Hi {},\n\nyour payment was approved. Your content is available in your EDUPLAY library.\n\n{}\n\nTotal: R$ {}",
        buyer.name,
        lines,
        total.to_reais()
    );
    Email::new(buyer.email.clone(), "Your EDUPLAY purchase is confirmed".to_string(), text)
}

#[cfg(test)]
mod tests {
    use tokio_core::reactor::Core;

    use super::*;
    use crate::client::email::mock::EmailClientMock;
    use crate::client::mercado_pago::mock::MercadoPagoClientMock;
    use crate::client::mercado_pago::Payment;
    use crate::repos::repo_factory::tests::*;

    fn payment(id: u64, status: &str, checkout_id: CheckoutId) -> Payment {
        Payment {
            id,
            status: status.to_string(),
            status_detail: None,
            external_reference: Some(checkout_id.to_string()),
            transaction_amount: Some(100.0),
        }
    }

    fn notification(id: u64) -> Notification {
        serde_json::from_value(json!({"type": "payment", "action": "payment.updated", "data": {"id": id}})).unwrap()
    }

    #[test]
    fn test_approval_notification_creates_one_commission() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let payments_client = MercadoPagoClientMock::default();
        let email_client = EmailClientMock::default();
        let service = create_service_with(None, repo_factory.clone(), payments_client.clone(), email_client.clone());

        let checkout_id = CheckoutId::generate();
        let order = create_pending_order(checkout_id);
        repo_factory.add_order(order.clone());
        payments_client.add_payment(payment(77, "approved", checkout_id));

        core.run(service.handle_notification(notification(77))).unwrap();
        let approved = repo_factory.order(order.id).unwrap();
        assert_eq!(approved.status, OrderStatus::Approved);
        assert_eq!(approved.payment_status, PaymentStatus::Paid);
        assert_eq!(approved.payment_id, Some("77".to_string()));
        let commission = repo_factory.commission(order.id).unwrap();
        assert_eq!(commission.amount, Amount::new(300));
        assert_eq!(commission.status, CommissionStatus::Pending);

        // repeated webhook
        core.run(service.handle_notification(notification(77))).unwrap();
        assert_eq!(repo_factory.commissions_count(), 1);
        assert_eq!(email_client.sent().len(), 1);
        assert_eq!(repo_factory.points(buyer_id()), 100 + 50);
    }

    #[test]
    fn test_notification_applies_to_every_order_of_large_checkout() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let payments_client = MercadoPagoClientMock::default();
        let service = create_service_with(None, repo_factory.clone(), payments_client.clone(), EmailClientMock::default());

        let checkout_id = CheckoutId::generate();
        let orders = (0..(MAX_PAGE_SIZE + 50)).map(|_| create_pending_order(checkout_id)).collect::<Vec<_>>();
        for order in &orders {
            repo_factory.add_order(order.clone());
        }
        payments_client.add_payment(payment(88, "approved", checkout_id));

        core.run(service.handle_notification(notification(88))).unwrap();
        assert!(orders
            .iter()
            .all(|order| repo_factory.order(order.id).unwrap().status == OrderStatus::Approved));
        assert_eq!(repo_factory.commissions_count(), orders.len());
    }

    #[test]
    fn test_stale_order_is_not_applied_twice() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let payments_client = MercadoPagoClientMock::default();
        let email_client = EmailClientMock::default();
        let service = create_service_with(None, repo_factory.clone(), payments_client.clone(), email_client.clone());

        let checkout_id = CheckoutId::generate();
        let stale = create_pending_order(checkout_id);
        repo_factory.add_order(stale.clone());
        payments_client.add_payment(payment(90, "approved", checkout_id));
        core.run(service.handle_notification(notification(90))).unwrap();
        let points = repo_factory.points(buyer_id());

        // a second writer still holding the pending copy
        let conn = MockConnection::default();
        let applied = apply_status(&repo_factory, &conn, &stale, OrderStatus::Approved, Some("90".to_string())).unwrap();
        assert!(applied.is_none());
        let applied = apply_status(&repo_factory, &conn, &stale, OrderStatus::Cancelled, None).unwrap();
        assert!(applied.is_none());

        assert_eq!(repo_factory.order(stale.id).unwrap().status, OrderStatus::Approved);
        assert_eq!(repo_factory.commissions_count(), 1);
        assert_eq!(repo_factory.points(buyer_id()), points);
        assert_eq!(email_client.sent().len(), 1);
    }

    #[test]
    fn test_refund_notification_cancels_commission() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let payments_client = MercadoPagoClientMock::default();
        let service = create_service_with(None, repo_factory.clone(), payments_client.clone(), EmailClientMock::default());

        let checkout_id = CheckoutId::generate();
        let order = create_pending_order(checkout_id);
        repo_factory.add_order(order.clone());
        payments_client.add_payment(payment(1, "approved", checkout_id));
        payments_client.add_payment(payment(2, "refunded", checkout_id));

        core.run(service.handle_notification(notification(1))).unwrap();
        core.run(service.handle_notification(notification(2))).unwrap();
        assert_eq!(repo_factory.order(order.id).unwrap().status, OrderStatus::Refunded);
        assert_eq!(repo_factory.commission(order.id).unwrap().status, CommissionStatus::Cancelled);
    }

    #[test]
    fn test_rejected_payment_cancels_only_pending_orders() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let payments_client = MercadoPagoClientMock::default();
        let service = create_service_with(None, repo_factory.clone(), payments_client.clone(), EmailClientMock::default());

        let checkout_id = CheckoutId::generate();
        let pending = create_pending_order(checkout_id);
        let approved = Order {
            status: OrderStatus::Approved,
            ..create_pending_order(checkout_id)
        };
        repo_factory.add_order(pending.clone());
        repo_factory.add_order(approved.clone());
        payments_client.add_payment(payment(3, "rejected", checkout_id));

        core.run(service.handle_notification(notification(3))).unwrap();
        assert_eq!(repo_factory.order(pending.id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(repo_factory.order(approved.id).unwrap().status, OrderStatus::Approved);
    }

    #[test]
    fn test_unknown_payment_and_other_topics() {
        let mut core = Core::new().unwrap();
        let service = create_service(None);
        let err = core.run(service.handle_notification(notification(404))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let merchant_order: Notification = serde_json::from_value(json!({"type": "merchant_order", "data": {"id": "1"}})).unwrap();
        assert!(core.run(service.handle_notification(merchant_order)).unwrap().ok);
    }

    #[test]
    fn test_admin_order_workflow() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let admin = create_service_with(Some(admin_id()), repo_factory.clone(), Default::default(), Default::default());
        let order = create_pending_order(CheckoutId::generate());
        repo_factory.add_order(order.clone());

        assert_eq!(core.run(admin.complete(order.id)).unwrap_err().kind(), ErrorKind::InvalidTransition);
        assert_eq!(core.run(admin.approve(order.id)).unwrap().status, OrderStatus::Approved);
        assert_eq!(core.run(admin.approve(order.id)).unwrap().status, OrderStatus::Approved);
        assert_eq!(repo_factory.commissions_count(), 1);
        assert_eq!(core.run(admin.complete(order.id)).unwrap().status, OrderStatus::Completed);
        assert_eq!(core.run(admin.cancel(order.id)).unwrap_err().kind(), ErrorKind::InvalidTransition);
        assert_eq!(core.run(admin.refund(order.id)).unwrap().status, OrderStatus::Refunded);

        let buyer = create_service_with(Some(buyer_id()), repo_factory.clone(), Default::default(), Default::default());
        assert_eq!(core.run(buyer.refund(order.id)).unwrap_err().kind(), ErrorKind::Forbidden);
        assert_eq!(core.run(buyer.get(order.id)).unwrap().id, order.id);
        assert_eq!(core.run(buyer.list_mine(Pagination::default())).unwrap().len(), 1);

        let stranger = create_service_with(Some(other_producer_id()), repo_factory.clone(), Default::default(), Default::default());
        assert_eq!(core.run(stranger.get(order.id)).unwrap_err().kind(), ErrorKind::Forbidden);
        assert!(core.run(stranger.list_sales(Pagination::default())).unwrap().is_empty());
    }
}
