//! Shopping cart of the current user

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use super::{current_user, validation_error, Error, ErrorContext, ErrorKind, Service};
use crate::controller::requests::AddCartItemRequest;
use crate::models::*;
use crate::repos::ReposFactory;

pub trait CartService {
    fn get_cart(&self) -> ServiceFuture<Cart>;
    /// Adds a published product that the user neither owns nor has bought
    fn add_item(&self, payload: AddCartItemRequest) -> ServiceFuture<Cart>;
    fn remove_item(&self, product_id: ProductId) -> ServiceFuture<Cart>;
    fn clear(&self) -> ServiceFuture<Cart>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > CartService for Service<T, M, F>
{
    fn get_cart(&self) -> ServiceFuture<Cart> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Getting cart of user {}", user.id);
            load_cart(&repo_factory, &*conn, user_id, user.id)
        })
    }

    fn add_item(&self, payload: AddCartItemRequest) -> ServiceFuture<Cart> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;
        let product_id = payload.product_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Adding product {} to cart of user {}", product_id, user.id);

            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let product = products_repo
                .get(product_id)
                .map_err(ectx!(try convert => product_id))?
                .filter(Product::is_published)
                .ok_or_else(|| {
                    let e = format_err!("Product {} is not for sale", product_id);
                    ectx!(try err e, ErrorContext::Cart, ErrorKind::NotFound => product_id)
                })?;
            check_purchasable(&repo_factory, &*conn, &user, &product)?;

            let cart_repo = repo_factory.create_cart_repo(&*conn, user_id);
            cart_repo
                .add(NewCartItem::new(user.id, product.id))
                .map_err(ectx!(try convert ErrorContext::Cart => product_id))?;
            load_cart(&repo_factory, &*conn, user_id, user.id)
        })
    }

    fn remove_item(&self, product_id: ProductId) -> ServiceFuture<Cart> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Removing product {} from cart of user {}", product_id, user.id);
            let cart_repo = repo_factory.create_cart_repo(&*conn, user_id);
            cart_repo
                .remove(user.id, product_id)
                .map_err(ectx!(try convert => product_id))?
                .ok_or_else(|| {
                    let e = format_err!("Product {} is not in the cart", product_id);
                    ectx!(try err e, ErrorContext::Cart, ErrorKind::NotFound => product_id)
                })?;
            load_cart(&repo_factory, &*conn, user_id, user.id)
        })
    }

    fn clear(&self) -> ServiceFuture<Cart> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Clearing cart of user {}", user.id);
            let cart_repo = repo_factory.create_cart_repo(&*conn, user_id);
            cart_repo.clear(user.id).map_err(ectx!(try convert => user.id))?;
            Ok(Cart {
                products: vec![],
                total: Amount::zero(),
            })
        })
    }
}

/// Products currently in the cart of `buyer_id`, with their total
pub fn load_cart<T, F>(repo_factory: &F, conn: &T, user_id: Option<UserId>, buyer_id: UserId) -> Result<Cart, Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    let cart_repo = repo_factory.create_cart_repo(conn, user_id);
    let product_ids = cart_repo
        .list(buyer_id)
        .map_err(ectx!(try convert => buyer_id))?
        .into_iter()
        .map(|item| item.product_id)
        .collect::<Vec<_>>();

    let products_repo = repo_factory.create_products_repo(conn, user_id);
    let products = products_repo
        .list_by_ids(&product_ids)
        .map_err(ectx!(try convert => product_ids))?;
    Cart::new(products).ok_or_else(|| {
        let e = format_err!("Cart total overflow");
        ectx!(err e, ErrorContext::AmountOverflow, ErrorKind::Internal => buyer_id)
    })
}

/// Buyers cannot purchase their own products or buy a product twice
pub fn check_purchasable<T, F>(repo_factory: &F, conn: &T, buyer: &User, product: &Product) -> Result<(), Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    if product.producer_id == buyer.id {
        let e = format_err!("Product {} belongs to the buyer", product.id);
        return Err(ectx!(err e, ErrorContext::Cart, validation_error("product_id", "own_product", "You cannot buy your own product".to_string()) => buyer.id));
    }

    let orders_repo = repo_factory.create_orders_repo_with_sys_acl(conn);
    let purchased = orders_repo
        .has_purchased(buyer.id, product.id)
        .map_err(ectx!(try convert => buyer.id, product.id))?;
    if purchased {
        let e = format_err!("Product {} was already purchased", product.id);
        return Err(ectx!(err e, ErrorContext::Cart, validation_error("product_id", "already_purchased", "You already own this product".to_string()) => buyer.id));
    }
    Ok(())
}
