//! Product catalog, producer listings and admin moderation

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use futures::{future, Future};
use r2d2::ManageConnection;

use super::gamification::apply_events_logged;
use super::types::ServiceFuture;
use super::{
    check_listing_source, check_listing_transition, current_user, moderation_email, optional_user, require_role, validate, validation_error, Error,
    ErrorContext, ErrorKind, Service,
};
use crate::client::email::Email;
use crate::controller::requests::{CreateProductRequest, RejectRequest, UpdateProductRequest};
use crate::models::*;
use crate::repos::ReposFactory;

pub trait ProductsService {
    /// Public catalog, only published products
    fn list_published(&self, search: ProductsSearch, pagination: Pagination) -> ServiceFuture<Vec<Product>>;
    /// Published product, or any product of the current producer
    fn get(&self, product_id: ProductId) -> ServiceFuture<Product>;
    /// All products of the current producer
    fn list_mine(&self, pagination: Pagination) -> ServiceFuture<Vec<Product>>;
    fn create(&self, payload: CreateProductRequest) -> ServiceFuture<Product>;
    fn update(&self, product_id: ProductId, payload: UpdateProductRequest) -> ServiceFuture<Product>;
    fn delete(&self, product_id: ProductId) -> ServiceFuture<Product>;
    /// Sends a draft to moderation
    fn submit(&self, product_id: ProductId) -> ServiceFuture<Product>;
    fn list_pending(&self, pagination: Pagination) -> ServiceFuture<Vec<Product>>;
    fn approve(&self, product_id: ProductId) -> ServiceFuture<Product>;
    fn reject(&self, product_id: ProductId, payload: RejectRequest) -> ServiceFuture<Product>;
    fn unpublish(&self, product_id: ProductId) -> ServiceFuture<Product>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > ProductsService for Service<T, M, F>
{
    fn list_published(&self, search: ProductsSearch, pagination: Pagination) -> ServiceFuture<Vec<Product>> {
        debug!("Listing published products with {:?}, {:?}", search, pagination);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let search = ProductsSearch {
                status: Some(ListingStatus::Published),
                ..search
            };
            products_repo.list(search, pagination).map_err(ectx!(convert))
        })
    }

    fn get(&self, product_id: ProductId) -> ServiceFuture<Product> {
        debug!("Getting product {}", product_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = optional_user(&repo_factory, &*conn, user_id)?;
            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let product = products_repo
                .get(product_id)
                .map_err(ectx!(try convert => product_id))?
                .ok_or_else(|| not_found(product_id))?;

            let visible = product.is_published()
                || user
                    .map(|user| user.role == Role::Admin || user.id == product.producer_id)
                    .unwrap_or(false);
            if visible {
                Ok(product)
            } else {
                Err(not_found(product_id))
            }
        })
    }

    fn list_mine(&self, pagination: Pagination) -> ServiceFuture<Vec<Product>> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&user, &[Role::Producer, Role::Admin])?;
            debug!("Listing products of producer {}", user.id);

            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let search = ProductsSearch {
                producer_id: Some(user.id),
                ..Default::default()
            };
            products_repo.list(search, pagination).map_err(ectx!(convert => user.id))
        })
    }

    fn create(&self, payload: CreateProductRequest) -> ServiceFuture<Product> {
        if let Err(e) = validate(&payload).and_then(|_| check_price(payload.price)) {
            return Box::new(future::err(e));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&user, &[Role::Producer])?;
            debug!("Creating product {} for producer {}", payload.title, user.id);

            let CreateProductRequest {
                title,
                description,
                kind,
                price,
            } = payload;
            let new_product = NewProduct {
                id: ProductId::generate(),
                producer_id: user.id,
                title,
                description,
                kind,
                price,
                status: ListingStatus::Draft,
            };
            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let product = products_repo.create(new_product).map_err(ectx!(try convert))?;
            info!("Product {} created by producer {}", product.id, user.id);
            Ok(product)
        })
    }

    fn update(&self, product_id: ProductId, payload: UpdateProductRequest) -> ServiceFuture<Product> {
        debug!("Updating product {} with {:?}", product_id, payload);

        let check = validate(&payload).and_then(|_| match payload.price {
            Some(price) => check_price(price),
            None => Ok(()),
        });
        if let Err(e) = check {
            return Box::new(future::err(e));
        }
        let update = UpdateProduct::from(payload);
        if update.is_empty() {
            let e = format_err!("Empty product update");
            return Box::new(future::err(ectx!(try err e, validation_error("product", "empty", "Nothing to update".to_string()))));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            current_user(&repo_factory, &*conn, user_id)?;
            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let product = editable_product(&*products_repo, product_id)?;
            products_repo.update(product.id, update).map_err(ectx!(convert => product_id))
        })
    }

    fn delete(&self, product_id: ProductId) -> ServiceFuture<Product> {
        debug!("Deleting product {}", product_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            current_user(&repo_factory, &*conn, user_id)?;
            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let product = editable_product(&*products_repo, product_id)?;
            let product = products_repo.delete(product.id).map_err(ectx!(try convert => product_id))?;
            info!("Product {} deleted", product.id);
            Ok(product)
        })
    }

    fn submit(&self, product_id: ProductId) -> ServiceFuture<Product> {
        debug!("Submitting product {} for approval", product_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let product = products_repo
                .get(product_id)
                .map_err(ectx!(try convert => product_id))?
                .ok_or_else(|| not_found(product_id))?;
            check_listing_transition(product.status, ListingStatus::PendingApproval, &user, product.producer_id)?;

            let product = products_repo
                .set_status(product_id, ListingStatus::PendingApproval, None)
                .map_err(ectx!(try convert => product_id))?;
            info!("Product {} submitted for approval", product.id);
            Ok(product)
        })
    }

    fn list_pending(&self, pagination: Pagination) -> ServiceFuture<Vec<Product>> {
        debug!("Listing products pending approval, {:?}", pagination);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;
            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let search = ProductsSearch {
                status: Some(ListingStatus::PendingApproval),
                ..Default::default()
            };
            products_repo.list(search, pagination).map_err(ectx!(convert))
        })
    }

    fn approve(&self, product_id: ProductId) -> ServiceFuture<Product> {
        self.moderate(product_id, ListingStatus::PendingApproval, ListingStatus::Published, None)
    }

    fn reject(&self, product_id: ProductId, payload: RejectRequest) -> ServiceFuture<Product> {
        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }
        self.moderate(product_id, ListingStatus::PendingApproval, ListingStatus::Draft, Some(payload.reason))
    }

    fn unpublish(&self, product_id: ProductId) -> ServiceFuture<Product> {
        self.moderate(product_id, ListingStatus::Published, ListingStatus::Draft, None)
    }
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Service<T, M, F>
{
    /// Admin decision on a product in status `from`. The producer is notified by email.
    fn moderate(&self, product_id: ProductId, from: ListingStatus, next: ListingStatus, reason: Option<String>) -> ServiceFuture<Product> {
        debug!("Moving product {} from {} to {}", product_id, from, next);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        let fut = self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;

            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let product = products_repo
                .get(product_id)
                .map_err(ectx!(try convert => product_id))?
                .ok_or_else(|| not_found(product_id))?;
            check_listing_source(product.status, from)?;
            check_listing_transition(product.status, next, &admin, product.producer_id)?;

            let product = products_repo
                .set_status(product_id, next, reason.clone())
                .map_err(ectx!(try convert => product_id, next))?;
            info!("Admin {} moved product {} to {}", admin.id, product.id, next);

            if next == ListingStatus::Published {
                let event = GamificationEvent::Publish {
                    producer_id: product.producer_id,
                };
                apply_events_logged(&repo_factory, &*conn, &[event]);
            }

            let users_repo = repo_factory.create_users_repo_with_sys_acl(&*conn);
            let producer = {
                let product = &product;
                users_repo
                    .get(product.producer_id)
                    .map_err(ectx!(try convert => product.producer_id))?
            };
            let email = producer.map(|producer| moderation_email(&producer, &product.title, next, reason.as_ref().map(String::as_str)));
            Ok((product, email))
        });

        Box::new(
            self.notify_after(fut, |(_, email): &(Product, Option<Email>)| email.clone())
                .map(|(product, _)| product),
        )
    }
}

fn not_found(product_id: ProductId) -> Error {
    let e = format_err!("Product {} not found", product_id);
    ectx!(err e, ErrorKind::NotFound => product_id)
}

fn check_price(price: Amount) -> Result<(), Error> {
    if price == Amount::zero() {
        let e = format_err!("Zero price");
        Err(ectx!(err e, validation_error("price", "zero", "Price must be positive".to_string())))
    } else {
        Ok(())
    }
}

/// Product that may still be edited or deleted, i.e. a draft
fn editable_product(products_repo: &dyn crate::repos::ProductsRepo, product_id: ProductId) -> Result<Product, Error> {
    let product = products_repo
        .get(product_id)
        .map_err(ectx!(try convert => product_id))?
        .ok_or_else(|| not_found(product_id))?;
    if !product.status.is_editable() {
        let e = format_err!("Product {} is {}", product_id, product.status);
        return Err(ectx!(err e, ErrorContext::ProductState, ErrorKind::InvalidTransition => product_id));
    }
    Ok(product)
}
