//! Upsell offers shown at checkout

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use futures::future;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use super::{current_user, require_role, validate, validation_error, Error, ErrorContext, ErrorKind, Service};
use crate::controller::requests::{CreateOrderBumpRequest, SetActiveRequest};
use crate::controller::responses::OrderBumpResponse;
use crate::models::*;
use crate::repos::{OrderBumpsRepo, ReposFactory};

pub trait OrderBumpsService {
    /// Active offers for buyers of `product_id`
    fn list_by_product(&self, product_id: ProductId) -> ServiceFuture<Vec<OrderBumpResponse>>;
    fn create(&self, payload: CreateOrderBumpRequest) -> ServiceFuture<OrderBump>;
    fn set_active(&self, order_bump_id: OrderBumpId, payload: SetActiveRequest) -> ServiceFuture<OrderBump>;
    fn delete(&self, order_bump_id: OrderBumpId) -> ServiceFuture<OrderBump>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > OrderBumpsService for Service<T, M, F>
{
    fn list_by_product(&self, product_id: ProductId) -> ServiceFuture<Vec<OrderBumpResponse>> {
        debug!("Listing order bumps of product {}", product_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let order_bumps_repo = repo_factory.create_order_bumps_repo(&*conn, user_id);
            let bumps = order_bumps_repo
                .list_by_product(product_id, true)
                .map_err(ectx!(try convert => product_id))?;

            let offer_ids = bumps.iter().map(|bump| bump.offer_product_id).collect::<Vec<_>>();
            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let offers = products_repo
                .list_by_ids(&offer_ids)
                .map_err(ectx!(try convert => offer_ids))?;

            Ok(bumps
                .into_iter()
                .filter_map(|order_bump| {
                    offers
                        .iter()
                        .find(|offer| offer.id == order_bump.offer_product_id && offer.is_published())
                        .cloned()
                        .map(|offer| OrderBumpResponse { order_bump, offer })
                })
                .collect())
        })
    }

    fn create(&self, payload: CreateOrderBumpRequest) -> ServiceFuture<OrderBump> {
        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&user, &[Role::Producer])?;
            debug!("Creating order bump {:?} for producer {}", payload, user.id);

            let CreateOrderBumpRequest {
                product_id,
                offer_product_id,
                headline,
                price,
            } = payload;
            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let find = |id: ProductId| -> Result<Product, Error> {
                products_repo.get(id).map_err(ectx!(try convert => id))?.ok_or_else(|| {
                    let e = format_err!("Product {} not found", id);
                    ectx!(try err e, ErrorContext::OrderBump, ErrorKind::NotFound => id)
                })
            };
            let trigger = find(product_id)?;
            let offer = find(offer_product_id)?;
            check_order_bump(user.id, &trigger, &offer, price).map_err(|violation| {
                let field = match violation {
                    OrderBumpRuleViolation::PriceNotDiscounted(_) => "price",
                    _ => "offer_product_id",
                };
                let message = violation.to_string();
                ectx!(try err violation, ErrorContext::OrderBump, validation_error(field, "order_bump_rules", message) => product_id, offer_product_id)
            })?;

            let new_order_bump = NewOrderBump {
                id: OrderBumpId::generate(),
                product_id,
                offer_product_id,
                producer_id: user.id,
                headline,
                price,
                active: true,
            };
            let order_bumps_repo = repo_factory.create_order_bumps_repo(&*conn, user_id);
            let order_bump = order_bumps_repo.create(new_order_bump).map_err(ectx!(try convert))?;
            info!("Order bump {} created by producer {}", order_bump.id, user.id);
            Ok(order_bump)
        })
    }

    fn set_active(&self, order_bump_id: OrderBumpId, payload: SetActiveRequest) -> ServiceFuture<OrderBump> {
        debug!("Setting order bump {} active: {}", order_bump_id, payload.active);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            let order_bumps_repo = repo_factory.create_order_bumps_repo(&*conn, user_id);
            owned_order_bump(&*order_bumps_repo, &user, order_bump_id)?;
            order_bumps_repo
                .set_active(order_bump_id, payload.active)
                .map_err(ectx!(convert => order_bump_id))
        })
    }

    fn delete(&self, order_bump_id: OrderBumpId) -> ServiceFuture<OrderBump> {
        debug!("Deleting order bump {}", order_bump_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            let order_bumps_repo = repo_factory.create_order_bumps_repo(&*conn, user_id);
            owned_order_bump(&*order_bumps_repo, &user, order_bump_id)?;
            order_bumps_repo.delete(order_bump_id).map_err(ectx!(convert => order_bump_id))
        })
    }
}

/// Order bump that `user` may change
fn owned_order_bump(order_bumps_repo: &dyn OrderBumpsRepo, user: &User, order_bump_id: OrderBumpId) -> Result<OrderBump, Error> {
    let order_bump = order_bumps_repo
        .get(order_bump_id)
        .map_err(ectx!(try convert => order_bump_id))?
        .ok_or_else(|| {
            let e = format_err!("Order bump {} not found", order_bump_id);
            ectx!(try err e, ErrorKind::NotFound => order_bump_id)
        })?;
    if user.role != Role::Admin && order_bump.producer_id != user.id {
        let e = format_err!("Order bump {} belongs to another producer", order_bump_id);
        return Err(ectx!(err e, ErrorKind::Forbidden => user.id, order_bump_id));
    }
    Ok(order_bump)
}
