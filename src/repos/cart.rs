//! Repo for cart_items table

use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Fail;

use crate::models::authorization::*;
use crate::models::{CartItem, NewCartItem, ProductId, UserId};
use crate::schema::cart_items::dsl as CartItems;

use super::acl::{self, Acl, CheckScope};
use super::error::*;
use super::types::RepoResult;

pub type CartRepoAcl = Box<dyn Acl<CartItem>>;

pub trait CartRepo {
    fn list(&self, user_id: UserId) -> RepoResult<Vec<CartItem>>;

    fn add(&self, payload: NewCartItem) -> RepoResult<CartItem>;

    fn remove(&self, user_id: UserId, product_id: ProductId) -> RepoResult<Option<CartItem>>;

    fn clear(&self, user_id: UserId) -> RepoResult<Vec<CartItem>>;
}

pub struct CartRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: CartRepoAcl,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CartRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: CartRepoAcl) -> Self {
        Self { db_conn, acl }
    }

    fn check_all(&self, items: &[CartItem], action: Action) -> RepoResult<()> {
        for item in items {
            let item_id = item.id;
            acl::check(&*self.acl, Resource::CartItems, action, self, Some(item)).map_err(ectx!(try ErrorKind::Forbidden => item_id))?;
        }
        Ok(())
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CartRepo for CartRepoImpl<'a, T> {
    fn list(&self, user_id: UserId) -> RepoResult<Vec<CartItem>> {
        debug!("Listing cart items of user {}", user_id);

        let items = CartItems::cart_items
            .filter(CartItems::user_id.eq(user_id))
            .order(CartItems::created_at.asc())
            .get_results::<CartItem>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => user_id)
            })?;

        self.check_all(&items, Action::Read)?;
        Ok(items)
    }

    fn add(&self, payload: NewCartItem) -> RepoResult<CartItem> {
        debug!("Adding product {} to cart of user {}", payload.product_id, payload.user_id);

        self.db_conn.transaction::<CartItem, Error, _>(|| {
            let item = diesel::insert_into(CartItems::cart_items)
                .values(&payload)
                .get_result::<CartItem>(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => payload)
                })?;
            self.check_all(&[item.clone()], Action::Write)?;
            Ok(item)
        })
    }

    fn remove(&self, user_id: UserId, product_id: ProductId) -> RepoResult<Option<CartItem>> {
        debug!("Removing product {} from cart of user {}", product_id, user_id);

        self.db_conn.transaction::<Option<CartItem>, Error, _>(|| {
            let filter = CartItems::cart_items
                .filter(CartItems::user_id.eq(user_id))
                .filter(CartItems::product_id.eq(product_id));
            let item = diesel::delete(filter)
                .get_result::<CartItem>(self.db_conn)
                .optional()
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => user_id, product_id)
                })?;
            if let Some(ref item) = item {
                self.check_all(&[item.clone()], Action::Write)?;
            }
            Ok(item)
        })
    }

    fn clear(&self, user_id: UserId) -> RepoResult<Vec<CartItem>> {
        debug!("Clearing cart of user {}", user_id);

        self.db_conn.transaction::<Vec<CartItem>, Error, _>(|| {
            let items = diesel::delete(CartItems::cart_items.filter(CartItems::user_id.eq(user_id)))
                .get_results::<CartItem>(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => user_id)
                })?;
            self.check_all(&items, Action::Write)?;
            Ok(items)
        })
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<CartItem> for CartRepoImpl<'a, T> {
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&CartItem>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => obj.map(|item| item.user_id == user_id).unwrap_or(false),
        }
    }
}
