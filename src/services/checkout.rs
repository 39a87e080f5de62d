//! Turning a cart, a single product or a combo into pending orders and a payment link

use std::collections::HashSet;

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use futures::Future;
use r2d2::ManageConnection;

use super::cart::{check_purchasable, load_cart};
use super::types::ServiceFuture;
use super::{current_user, validation_error, Error, ErrorContext, ErrorKind, Service};
use crate::client::mercado_pago::{CreatePreference, MercadoPagoClient, PreferenceItem};
use crate::controller::requests::CheckoutRequest;
use crate::controller::responses::CheckoutResponse;
use crate::models::*;
use crate::repos::ReposFactory;

pub trait CheckoutService {
    /// Buys everything in the cart and empties it
    fn checkout_cart(&self, payload: CheckoutRequest) -> ServiceFuture<CheckoutResponse>;
    /// "Buy now" of a single published product
    fn checkout_product(&self, product_id: ProductId, payload: CheckoutRequest) -> ServiceFuture<CheckoutResponse>;
    fn checkout_combo(&self, combo_id: ComboId, payload: CheckoutRequest) -> ServiceFuture<CheckoutResponse>;
}

/// One future order
#[derive(Debug, Clone)]
struct LineItem {
    producer_id: UserId,
    item: OrderItem,
    price: Amount,
    title: String,
}

/// Orders written for one checkout, waiting for a payment preference
#[derive(Debug, Clone)]
struct PlacedCheckout {
    checkout_id: CheckoutId,
    payer_email: String,
    orders: Vec<Order>,
    titles: Vec<String>,
    total: Amount,
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > CheckoutService for Service<T, M, F>
{
    fn checkout_cart(&self, payload: CheckoutRequest) -> ServiceFuture<CheckoutResponse> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;
        let rate_bps = self.static_context.config.commission.rate_bps;

        let placed = self.spawn_on_pool(move |conn| {
            let buyer = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Checking out cart of user {}", buyer.id);

            let cart = load_cart(&repo_factory, &*conn, user_id, buyer.id)?;
            if cart.products.is_empty() {
                let e = format_err!("Cart of user {} is empty", buyer.id);
                return Err(ectx!(err e, ErrorContext::Cart, validation_error("cart", "empty", "Cart is empty".to_string()) => buyer.id));
            }

            let mut items = vec![];
            for product in &cart.products {
                check_for_sale(product)?;
                check_purchasable(&repo_factory, &*conn, &buyer, product)?;
                items.push(product_item(product));
            }
            let trigger_ids = cart.products.iter().map(|p| p.id).collect::<Vec<_>>();
            items.extend(bump_items(&repo_factory, &*conn, &buyer, &payload.order_bump_ids, &trigger_ids)?);

            place_orders(&repo_factory, &*conn, &buyer, items, rate_bps, true)
        });

        self.request_payment(placed)
    }

    fn checkout_product(&self, product_id: ProductId, payload: CheckoutRequest) -> ServiceFuture<CheckoutResponse> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;
        let rate_bps = self.static_context.config.commission.rate_bps;

        let placed = self.spawn_on_pool(move |conn| {
            let buyer = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Checking out product {} for user {}", product_id, buyer.id);

            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let product = products_repo
                .get(product_id)
                .map_err(ectx!(try convert => product_id))?
                .ok_or_else(|| {
                    let e = format_err!("Product {} not found", product_id);
                    ectx!(try err e, ErrorKind::NotFound => product_id)
                })?;
            check_for_sale(&product)?;
            check_purchasable(&repo_factory, &*conn, &buyer, &product)?;

            let mut items = vec![product_item(&product)];
            items.extend(bump_items(&repo_factory, &*conn, &buyer, &payload.order_bump_ids, &[product.id])?);
            place_orders(&repo_factory, &*conn, &buyer, items, rate_bps, false)
        });

        self.request_payment(placed)
    }

    fn checkout_combo(&self, combo_id: ComboId, payload: CheckoutRequest) -> ServiceFuture<CheckoutResponse> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;
        let rate_bps = self.static_context.config.commission.rate_bps;

        let placed = self.spawn_on_pool(move |conn| {
            let buyer = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Checking out combo {} for user {}", combo_id, buyer.id);

            let combos_repo = repo_factory.create_combos_repo(&*conn, user_id);
            let combo = combos_repo
                .get(combo_id)
                .map_err(ectx!(try convert => combo_id))?
                .filter(|combo| combo.active)
                .ok_or_else(|| {
                    let e = format_err!("Combo {} is not for sale", combo_id);
                    ectx!(try err e, ErrorContext::Combo, ErrorKind::NotFound => combo_id)
                })?;
            if combo.producer_id == buyer.id {
                let e = format_err!("Combo {} belongs to the buyer", combo_id);
                return Err(ectx!(err e, ErrorContext::Combo, validation_error("combo_id", "own_product", "You cannot buy your own combo".to_string()) => buyer.id));
            }

            let product_ids = combos_repo.product_ids(combo_id).map_err(ectx!(try convert => combo_id))?;
            check_combo_products(&repo_factory, &*conn, &buyer, combo_id, &product_ids)?;
            let item = LineItem {
                producer_id: combo.producer_id,
                item: OrderItem::Combo(combo.id),
                price: combo.price,
                title: combo.title.clone(),
            };
            let mut items = vec![item];
            items.extend(bump_items(&repo_factory, &*conn, &buyer, &payload.order_bump_ids, &product_ids)?);
            place_orders(&repo_factory, &*conn, &buyer, items, rate_bps, false)
        });

        self.request_payment(placed)
    }
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Service<T, M, F>
{
    /// Creates the Mercado Pago preference paying all orders of the checkout.
    /// On failure the orders stay pending and can be cancelled by an admin.
    fn request_payment(&self, placed: ServiceFuture<PlacedCheckout>) -> ServiceFuture<CheckoutResponse> {
        let payments_client = self.static_context.payments_client.clone();
        let notification_url = self.static_context.config.mercado_pago.notification_url.clone();
        let success_url = self.static_context.config.mercado_pago.success_url.clone();

        Box::new(placed.and_then(move |placed| {
            let PlacedCheckout {
                checkout_id,
                payer_email,
                orders,
                titles,
                total,
            } = placed;
            let items = orders
                .iter()
                .zip(titles.into_iter())
                .map(|(order, title)| PreferenceItem::new(order.id.to_string(), title, order.amount))
                .collect();
            let preference = CreatePreference::new(checkout_id, items, payer_email, notification_url, success_url);

            payments_client
                .create_preference(preference)
                .map_err(ectx!(try convert => checkout_id))
                .map(move |preference| {
                    info!("Checkout {} created with {} orders, total {}", checkout_id, orders.len(), total);
                    CheckoutResponse {
                        checkout_id,
                        orders,
                        total,
                        payment_url: preference.init_point,
                    }
                })
        }))
    }
}

fn product_item(product: &Product) -> LineItem {
    LineItem {
        producer_id: product.producer_id,
        item: OrderItem::Product(product.id),
        price: product.price,
        title: product.title.clone(),
    }
}

fn check_for_sale(product: &Product) -> Result<(), Error> {
    if product.is_published() {
        Ok(())
    } else {
        let e = format_err!("Product {} is {}", product.id, product.status);
        Err(ectx!(err e, ErrorContext::Cart, ErrorKind::NotFound => product.id))
    }
}

/// Every product of the combo must still be published and not owned by the buyer
fn check_combo_products<T, F>(repo_factory: &F, conn: &T, buyer: &User, combo_id: ComboId, product_ids: &[ProductId]) -> Result<(), Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    let products_repo = repo_factory.create_products_repo_with_sys_acl(conn);
    let products = products_repo
        .list_by_ids(product_ids)
        .map_err(ectx!(try convert ErrorContext::Combo => combo_id))?;
    let unavailable = products.len() != product_ids.len() || products.iter().any(|product| !product.is_published());
    if unavailable {
        let e = format_err!("Combo {} contains products that are not for sale", combo_id);
        return Err(ectx!(err e, ErrorContext::Combo, validation_error("combo_id", "unavailable_product", "This combo contains products that are no longer available".to_string()) => combo_id));
    }

    for product in &products {
        check_purchasable(repo_factory, conn, buyer, product)?;
    }
    Ok(())
}

/// Accepted order bumps. Every bump must be active and triggered by one of `trigger_ids`.
fn bump_items<T, F>(repo_factory: &F, conn: &T, buyer: &User, bump_ids: &[OrderBumpId], trigger_ids: &[ProductId]) -> Result<Vec<LineItem>, Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    let mut seen = HashSet::new();
    let bump_ids = bump_ids.iter().cloned().filter(|id| seen.insert(*id)).collect::<Vec<_>>();
    if bump_ids.is_empty() {
        return Ok(vec![]);
    }

    let order_bumps_repo = repo_factory.create_order_bumps_repo_with_sys_acl(conn);
    let bump_ids_cloned = bump_ids.clone();
    let bumps = order_bumps_repo
        .list_by_ids(&bump_ids)
        .map_err(ectx!(try convert ErrorContext::OrderBump => bump_ids_cloned))?;
    if bumps.len() != bump_ids.len() {
        let e = format_err!("Some order bumps do not exist");
        return Err(ectx!(err e, ErrorContext::OrderBump, ErrorKind::NotFound => bump_ids));
    }

    let offer_ids = bumps.iter().map(|bump| bump.offer_product_id).collect::<Vec<_>>();
    let products_repo = repo_factory.create_products_repo_with_sys_acl(conn);
    let offers = products_repo
        .list_by_ids(&offer_ids)
        .map_err(ectx!(try convert ErrorContext::OrderBump => offer_ids))?;

    let mut items = vec![];
    for bump in bumps {
        if !bump.active || !trigger_ids.contains(&bump.product_id) {
            let e = format_err!("Order bump {} does not apply to this checkout", bump.id);
            return Err(ectx!(err e, ErrorContext::OrderBump, validation_error("order_bump_ids", "not_applicable", "Offer is not available for this purchase".to_string()) => bump.id));
        }
        if trigger_ids.contains(&bump.offer_product_id) {
            let e = format_err!("Order bump {} offers a product of the checkout", bump.id);
            return Err(ectx!(err e, ErrorContext::OrderBump, validation_error("order_bump_ids", "duplicate", "Offered product is already in this purchase".to_string()) => bump.id));
        }
        let offer = offers
            .iter()
            .find(|offer| offer.id == bump.offer_product_id)
            .ok_or_else(|| {
                let e = format_err!("Offered product {} not found", bump.offer_product_id);
                ectx!(try err e, ErrorContext::OrderBump, ErrorKind::NotFound => bump.id)
            })?;
        check_for_sale(offer)?;
        check_purchasable(repo_factory, conn, buyer, offer)?;

        items.push(LineItem {
            producer_id: bump.producer_id,
            item: OrderItem::Bump {
                bump_id: bump.id,
                product_id: offer.id,
            },
            price: bump.price,
            title: offer.title.clone(),
        });
    }
    Ok(items)
}

/// Writes one pending order per item in a single transaction
fn place_orders<T, F>(repo_factory: &F, conn: &T, buyer: &User, items: Vec<LineItem>, rate_bps: u32, clear_cart: bool) -> Result<PlacedCheckout, Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    let checkout_id = CheckoutId::generate();
    let total = Amount::checked_sum(items.iter().map(|item| item.price)).ok_or_else(|| {
        let e = format_err!("Checkout total overflow");
        ectx!(try err e, ErrorContext::AmountOverflow, ErrorKind::Internal => checkout_id)
    })?;

    let mut new_orders = vec![];
    let mut titles = vec![];
    for LineItem {
        producer_id,
        item,
        price,
        title,
    } in items
    {
        let split = CommissionSplit::calculate(price, rate_bps).ok_or_else(|| {
            let e = format_err!("Invalid commission rate {}", rate_bps);
            ectx!(try err e, ErrorContext::AmountOverflow, ErrorKind::Internal => price, rate_bps)
        })?;
        new_orders.push(NewOrder::new(checkout_id, buyer.id, producer_id, item, price, split));
        titles.push(title);
    }

    let orders_repo = repo_factory.create_orders_repo_with_sys_acl(conn);
    let cart_repo = repo_factory.create_cart_repo(conn, Some(buyer.id));
    let buyer_id = buyer.id;
    let orders = conn.transaction::<_, Error, _>(move || {
        let orders = orders_repo.create_many(new_orders).map_err(ectx!(try convert => checkout_id))?;
        if clear_cart {
            cart_repo.clear(buyer_id).map_err(ectx!(try convert => buyer_id))?;
        }
        Ok(orders)
    })?;

    Ok(PlacedCheckout {
        checkout_id,
        payer_email: buyer.email.clone(),
        orders,
        titles,
        total,
    })
}

#[cfg(test)]
mod tests {
    use tokio_core::reactor::Core;

    use super::*;
    use crate::client::email::mock::EmailClientMock;
    use crate::client::mercado_pago::mock::MercadoPagoClientMock;
    use crate::controller::requests::AddCartItemRequest;
    use crate::repos::repo_factory::tests::*;
    use crate::services::cart::CartService;

    fn with_bumps(order_bump_ids: Vec<OrderBumpId>) -> CheckoutRequest {
        CheckoutRequest { order_bump_ids }
    }

    #[test]
    fn test_buy_now() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let payments_client = MercadoPagoClientMock::default();
        let service = create_service_with(Some(buyer_id()), repo_factory.clone(), payments_client.clone(), EmailClientMock::default());

        let response = core.run(service.checkout_product(published_product_id(), CheckoutRequest::default())).unwrap();
        assert_eq!(response.orders.len(), 1);
        assert_eq!(response.total, Amount::new(PRODUCT_PRICE));
        let order = &response.orders[0];
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.checkout_id, response.checkout_id);
        assert_eq!(order.platform_fee, Amount::new(300));
        assert_eq!(order.producer_amount, Amount::new(9_700));
        assert!(response.payment_url.contains(&response.checkout_id.to_string()));

        let preferences = payments_client.preferences();
        assert_eq!(preferences.len(), 1);
        assert_eq!(preferences[0].external_reference, response.checkout_id.to_string());
        assert!(repo_factory.order(order.id).is_some());
    }

    #[test]
    fn test_buy_now_with_order_bump() {
        let mut core = Core::new().unwrap();
        let service = create_service(Some(buyer_id()));
        let response = core
            .run(service.checkout_product(published_product_id(), with_bumps(vec![order_bump_id(), order_bump_id()])))
            .unwrap();
        assert_eq!(response.orders.len(), 2);
        assert_eq!(response.total, Amount::new(PRODUCT_PRICE + 4_990));
        let bump_order = response.orders.iter().find(|order| order.order_bump_id.is_some()).unwrap();
        assert_eq!(bump_order.product_id, Some(second_published_product_id()));
        assert_eq!(bump_order.amount, Amount::new(4_990));
    }

    #[test]
    fn test_bump_must_match_trigger() {
        let mut core = Core::new().unwrap();
        let service = create_service(Some(buyer_id()));
        let err = core
            .run(service.checkout_product(second_published_product_id(), with_bumps(vec![order_bump_id()])))
            .unwrap_err();
        match err.kind() {
            ErrorKind::Validation(_) => (),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_cart_checkout_clears_cart() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let service = create_service_with(Some(buyer_id()), repo_factory.clone(), Default::default(), Default::default());

        let err = core.run(service.checkout_cart(CheckoutRequest::default())).unwrap_err();
        match err.kind() {
            ErrorKind::Validation(_) => (),
            other => panic!("unexpected kind {:?}", other),
        }

        for product_id in vec![published_product_id(), second_published_product_id()] {
            core.run(service.add_item(AddCartItemRequest { product_id })).unwrap();
        }
        let response = core.run(service.checkout_cart(CheckoutRequest::default())).unwrap();
        assert_eq!(response.orders.len(), 2);
        assert!(response.orders.iter().all(|order| order.checkout_id == response.checkout_id));
        assert!(repo_factory.state.lock().unwrap().cart.is_empty());
    }

    #[test]
    fn test_combo_checkout() {
        let mut core = Core::new().unwrap();
        let service = create_service(Some(buyer_id()));
        let response = core.run(service.checkout_combo(combo_id(), CheckoutRequest::default())).unwrap();
        assert_eq!(response.orders.len(), 1);
        assert_eq!(response.orders[0].combo_id, Some(combo_id()));
        assert_eq!(response.total, Amount::new(15_000));

        let producer = create_service(Some(producer_id()));
        match core.run(producer.checkout_combo(combo_id(), CheckoutRequest::default())).unwrap_err().kind() {
            ErrorKind::Validation(_) => (),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_combo_checkout_checks_each_product() {
        let mut core = Core::new().unwrap();
        let repo_factory = ReposFactoryMock::default();
        let service = create_service_with(Some(buyer_id()), repo_factory.clone(), Default::default(), Default::default());

        for combo_id in vec![unlisted_combo_id(), owned_combo_id()] {
            match core.run(service.checkout_combo(combo_id, CheckoutRequest::default())).unwrap_err().kind() {
                ErrorKind::Validation(_) => (),
                other => panic!("unexpected kind {:?}", other),
            }
        }
        assert!(repo_factory.state.lock().unwrap().orders.is_empty());
    }

    #[test]
    fn test_unavailable_products() {
        let mut core = Core::new().unwrap();
        let service = create_service(Some(buyer_id()));
        let err = core.run(service.checkout_product(draft_product_id(), CheckoutRequest::default())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = core.run(service.checkout_product(missing_product_id(), CheckoutRequest::default())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let anonymous = create_service(None);
        let err = core.run(anonymous.checkout_product(published_product_id(), CheckoutRequest::default())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
