//! `Controller` is a top layer that handles all http-related
//! stuff like reading bodies, parsing params, forming a response.
//! Basically it provides inputs to `Service` layer and converts outputs
//! of `Service` layer to http responses

pub mod context;
pub mod requests;
pub mod responses;
pub mod routes;

use std::collections::HashMap;
use std::sync::Arc;

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::{Error as FailureError, Fail};
use futures::future;
use futures::Future;
use hyper::server::Request;
use hyper::{Delete, Get, Post, Put};
use r2d2::ManageConnection;
use uuid::Uuid;

use self::context::{DynamicContext, StaticContext};
use self::requests::*;
use self::routes::{ModerationAction, OrderAction, Route};
use crate::client::mercado_pago::Notification;
use crate::errors::Error;
use crate::http::request_util::{bearer_token, controller_error, parse_body, parse_query, query_param, serialize_future};
use crate::http::{Controller, ControllerFuture, RouteParser};
use crate::models::*;
use crate::repos::repo_factory::*;
use crate::services::apps::AppsService;
use crate::services::auth::{decode_token, AuthService};
use crate::services::cart::CartService;
use crate::services::checkout::CheckoutService;
use crate::services::combos::CombosService;
use crate::services::commissions::CommissionsService;
use crate::services::dashboard::DashboardService;
use crate::services::gamification::GamificationService;
use crate::services::order_bumps::OrderBumpsService;
use crate::services::orders::OrdersService;
use crate::services::products::ProductsService;
use crate::services::types::ServiceFuture;
use crate::services::users::UsersService;
use crate::services::Service;

/// Controller handles route parsing and calling `Service` layer
pub struct ControllerImpl<T, M, F>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    M: ManageConnection<Connection = T>,
    F: ReposFactory<T>,
{
    pub static_context: StaticContext<T, M, F>,
    pub route_parser: Arc<RouteParser<Route>>,
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > ControllerImpl<T, M, F>
{
    /// Create a new controller based on services
    pub fn new(static_context: StaticContext<T, M, F>) -> Self {
        let route_parser = Arc::new(routes::create_route_parser());
        Self {
            static_context,
            route_parser,
        }
    }
}

/// Puts the http counterpart of a service error on top of its chain
fn service_result<T: 'static>(fut: ServiceFuture<T>) -> Box<dyn Future<Item = T, Error = FailureError>> {
    Box::new(fut.map_err(|e| {
        let error = Error::from(e.kind());
        FailureError::from(e.context(error))
    }))
}

fn pagination(params: &HashMap<String, String>) -> Pagination {
    Pagination::new(query_param(params, "skip"), query_param(params, "count"))
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Controller for ControllerImpl<T, M, F>
{
    /// Handle a request and get future response
    fn call(&self, req: Request) -> ControllerFuture {
        let user_id = match bearer_token(req.headers()) {
            Some(token) => match decode_token(&self.static_context.config.auth.jwt_secret, &token) {
                Ok(user_id) => Some(user_id),
                Err(e) => return controller_error(Error::Unauthorized, e.to_string()),
            },
            None => None,
        };
        let correlation_token = Uuid::new_v4().to_string();
        let service = Service::new(self.static_context.clone(), DynamicContext::new(user_id, correlation_token));

        let path = req.path().to_string();
        let params = parse_query(req.query());
        let pagination = pagination(&params);

        match (&req.method().clone(), self.route_parser.test(req.path())) {
            (&Post, Some(Route::AuthRegister)) => serialize_future(parse_body::<RegisterRequest>(req.body()).and_then(move |data| {
                debug!("Received request to register {}", data.email);
                service_result(AuthService::register(&service, data))
            })),
            (&Post, Some(Route::AuthLogin)) => serialize_future(parse_body::<Credentials>(req.body()).and_then(move |data| {
                debug!("Received request to log in {}", data.email);
                service_result(AuthService::login(&service, data))
            })),
            (&Get, Some(Route::AuthMe)) => serialize_future(service_result(AuthService::me(&service))),

            (&Put, Some(Route::UsersMe)) => serialize_future(parse_body::<UpdateProfileRequest>(req.body()).and_then(move |data| {
                debug!("Received request to update profile {:?}", data);
                service_result(UsersService::update_profile(&service, data))
            })),
            (&Put, Some(Route::UsersMePayout)) => serialize_future(parse_body::<UpdatePayoutRequest>(req.body()).and_then(move |data| {
                debug!("Received request to update payout details");
                service_result(UsersService::update_payout(&service, data))
            })),

            (&Get, Some(Route::Products)) => {
                let search = ProductsSearch {
                    kind: query_param(&params, "kind"),
                    title: params.get("title").cloned(),
                    ..Default::default()
                };
                debug!("Received request to list products {:?} {:?}", search, pagination);
                serialize_future(service_result(ProductsService::list_published(&service, search, pagination)))
            }
            (&Post, Some(Route::Products)) => serialize_future(parse_body::<CreateProductRequest>(req.body()).and_then(move |data| {
                debug!("Received request to create product {:?}", data);
                service_result(ProductsService::create(&service, data))
            })),
            (&Get, Some(Route::ProductsMine)) => serialize_future(service_result(ProductsService::list_mine(&service, pagination))),
            (&Get, Some(Route::Product { id })) => {
                debug!("Received request to get product {}", id);
                serialize_future(service_result(ProductsService::get(&service, id)))
            }
            (&Put, Some(Route::Product { id })) => serialize_future(parse_body::<UpdateProductRequest>(req.body()).and_then(move |data| {
                debug!("Received request to update product {} with {:?}", id, data);
                service_result(ProductsService::update(&service, id, data))
            })),
            (&Delete, Some(Route::Product { id })) => {
                debug!("Received request to delete product {}", id);
                serialize_future(service_result(ProductsService::delete(&service, id)))
            }
            (&Post, Some(Route::ProductSubmit { id })) => {
                debug!("Received request to submit product {}", id);
                serialize_future(service_result(ProductsService::submit(&service, id)))
            }

            (&Get, Some(Route::Cart)) => serialize_future(service_result(CartService::get_cart(&service))),
            (&Delete, Some(Route::Cart)) => serialize_future(service_result(CartService::clear(&service))),
            (&Post, Some(Route::CartItems)) => serialize_future(parse_body::<AddCartItemRequest>(req.body()).and_then(move |data| {
                debug!("Received request to add {:?} to cart", data);
                service_result(CartService::add_item(&service, data))
            })),
            (&Delete, Some(Route::CartItem { product_id })) => {
                debug!("Received request to remove product {} from cart", product_id);
                serialize_future(service_result(CartService::remove_item(&service, product_id)))
            }
            (&Post, Some(Route::CartCheckout)) => serialize_future(parse_body::<CheckoutRequest>(req.body()).and_then(move |data| {
                debug!("Received request to check out cart {:?}", data);
                service_result(CheckoutService::checkout_cart(&service, data))
            })),
            (&Post, Some(Route::CheckoutProduct { id })) => serialize_future(parse_body::<CheckoutRequest>(req.body()).and_then(move |data| {
                debug!("Received request to check out product {} {:?}", id, data);
                service_result(CheckoutService::checkout_product(&service, id, data))
            })),
            (&Post, Some(Route::CheckoutCombo { id })) => serialize_future(parse_body::<CheckoutRequest>(req.body()).and_then(move |data| {
                debug!("Received request to check out combo {} {:?}", id, data);
                service_result(CheckoutService::checkout_combo(&service, id, data))
            })),

            (&Get, Some(Route::Orders)) => serialize_future(service_result(OrdersService::list_mine(&service, pagination))),
            (&Get, Some(Route::Order { id })) => {
                debug!("Received request to get order {}", id);
                serialize_future(service_result(OrdersService::get(&service, id)))
            }
            (&Get, Some(Route::Sales)) => serialize_future(service_result(OrdersService::list_sales(&service, pagination))),
            (&Post, Some(Route::MercadoPagoWebhook)) => {
                let from_query = Notification::from_query(&params);
                serialize_future(
                    parse_body::<Notification>(req.body())
                        .or_else(move |e| from_query.ok_or(e))
                        .and_then(move |notification| {
                            info!("Received Mercado Pago notification {:?}", notification);
                            service_result(OrdersService::handle_notification(&service, notification))
                        }),
                )
            }
            (&Get, Some(Route::Commissions)) => serialize_future(service_result(CommissionsService::list_mine(&service, pagination))),

            (&Get, Some(Route::Combos)) => {
                let search = CombosSearch {
                    producer_id: query_param(&params, "producer_id"),
                    ..Default::default()
                };
                serialize_future(service_result(CombosService::list(&service, search, pagination)))
            }
            (&Post, Some(Route::Combos)) => serialize_future(parse_body::<CreateComboRequest>(req.body()).and_then(move |data| {
                debug!("Received request to create combo {:?}", data);
                service_result(CombosService::create(&service, data))
            })),
            (&Get, Some(Route::Combo { id })) => serialize_future(service_result(CombosService::get(&service, id))),
            (&Put, Some(Route::Combo { id })) => serialize_future(parse_body::<UpdateComboRequest>(req.body()).and_then(move |data| {
                debug!("Received request to update combo {} with {:?}", id, data);
                service_result(CombosService::update(&service, id, data))
            })),
            (&Delete, Some(Route::Combo { id })) => {
                debug!("Received request to delete combo {}", id);
                serialize_future(service_result(CombosService::delete(&service, id)))
            }

            (&Get, Some(Route::OrderBumpsByProduct { product_id })) => {
                serialize_future(service_result(OrderBumpsService::list_by_product(&service, product_id)))
            }
            (&Post, Some(Route::OrderBumps)) => serialize_future(parse_body::<CreateOrderBumpRequest>(req.body()).and_then(move |data| {
                debug!("Received request to create order bump {:?}", data);
                service_result(OrderBumpsService::create(&service, data))
            })),
            (&Put, Some(Route::OrderBumpActive { id })) => serialize_future(parse_body::<SetActiveRequest>(req.body()).and_then(move |data| {
                debug!("Received request to set order bump {} active to {}", id, data.active);
                service_result(OrderBumpsService::set_active(&service, id, data))
            })),
            (&Delete, Some(Route::OrderBump { id })) => {
                debug!("Received request to delete order bump {}", id);
                serialize_future(service_result(OrderBumpsService::delete(&service, id)))
            }

            (&Get, Some(Route::Apps)) => {
                let search = AppsSearch {
                    platform: query_param(&params, "platform"),
                    ..Default::default()
                };
                serialize_future(service_result(AppsService::list_published(&service, search, pagination)))
            }
            (&Post, Some(Route::Apps)) => serialize_future(parse_body::<CreateAppRequest>(req.body()).and_then(move |data| {
                debug!("Received request to create app {:?}", data);
                service_result(AppsService::create(&service, data))
            })),
            (&Get, Some(Route::App { id })) => serialize_future(service_result(AppsService::get(&service, id))),
            (&Put, Some(Route::App { id })) => serialize_future(parse_body::<UpdateAppRequest>(req.body()).and_then(move |data| {
                debug!("Received request to update app {} with {:?}", id, data);
                service_result(AppsService::update(&service, id, data))
            })),
            (&Delete, Some(Route::App { id })) => {
                debug!("Received request to delete app {}", id);
                serialize_future(service_result(AppsService::delete(&service, id)))
            }
            (&Post, Some(Route::AppSubmit { id })) => {
                debug!("Received request to submit app {}", id);
                serialize_future(service_result(AppsService::submit(&service, id)))
            }

            (&Get, Some(Route::GamificationMe)) => serialize_future(service_result(GamificationService::profile(&service))),
            (&Get, Some(Route::GamificationBadges)) => serialize_future(service_result(GamificationService::badges(&service))),
            (&Get, Some(Route::GamificationMissions)) => serialize_future(service_result(GamificationService::missions(&service))),
            (&Get, Some(Route::GamificationLeaderboard)) => serialize_future(service_result(GamificationService::leaderboard(&service))),

            (&Get, Some(Route::AdminUsers)) => {
                let search = UsersSearch {
                    role: query_param(&params, "role"),
                    status: query_param(&params, "status"),
                    email: params.get("email").cloned(),
                };
                serialize_future(service_result(UsersService::list_users(&service, search, pagination)))
            }
            (&Put, Some(Route::AdminUserRole { user_id })) => serialize_future(parse_body::<SetRoleRequest>(req.body()).and_then(move |data| {
                info!("Received request to set role of user {} to {}", user_id, data.role);
                service_result(UsersService::set_role(&service, user_id, data.role))
            })),
            (&Put, Some(Route::AdminUserStatus { user_id })) => {
                serialize_future(parse_body::<SetStatusRequest>(req.body()).and_then(move |data| {
                    info!("Received request to set status of user {} to {}", user_id, data.status);
                    service_result(UsersService::set_status(&service, user_id, data.status))
                }))
            }
            (&Get, Some(Route::AdminProductsPending)) => serialize_future(service_result(ProductsService::list_pending(&service, pagination))),
            (&Post, Some(Route::AdminProductModeration { id, action })) => {
                debug!("Received request to {:?} product {}", action, id);
                match action {
                    ModerationAction::Approve => serialize_future(service_result(ProductsService::approve(&service, id))),
                    ModerationAction::Unpublish => serialize_future(service_result(ProductsService::unpublish(&service, id))),
                    ModerationAction::Reject => serialize_future(
                        parse_body::<RejectRequest>(req.body()).and_then(move |data| service_result(ProductsService::reject(&service, id, data))),
                    ),
                }
            }
            (&Get, Some(Route::AdminAppsPending)) => serialize_future(service_result(AppsService::list_pending(&service, pagination))),
            (&Post, Some(Route::AdminAppModeration { id, action })) => {
                debug!("Received request to {:?} app {}", action, id);
                match action {
                    ModerationAction::Approve => serialize_future(service_result(AppsService::approve(&service, id))),
                    ModerationAction::Unpublish => serialize_future(service_result(AppsService::unpublish(&service, id))),
                    ModerationAction::Reject => serialize_future(
                        parse_body::<RejectRequest>(req.body()).and_then(move |data| service_result(AppsService::reject(&service, id, data))),
                    ),
                }
            }
            (&Get, Some(Route::AdminOrders)) => {
                let search = OrdersSearch {
                    buyer_id: query_param(&params, "buyer_id"),
                    producer_id: query_param(&params, "producer_id"),
                    checkout_id: query_param(&params, "checkout_id"),
                    status: query_param(&params, "status"),
                };
                serialize_future(service_result(OrdersService::list_all(&service, search, pagination)))
            }
            (&Post, Some(Route::AdminOrderAction { id, action })) => {
                info!("Received request to {:?} order {}", action, id);
                let fut = match action {
                    OrderAction::Approve => OrdersService::approve(&service, id),
                    OrderAction::Complete => OrdersService::complete(&service, id),
                    OrderAction::Refund => OrdersService::refund(&service, id),
                    OrderAction::Cancel => OrdersService::cancel(&service, id),
                };
                serialize_future(service_result(fut))
            }
            (&Get, Some(Route::AdminCommissions)) => {
                let search = CommissionsSearch {
                    producer_id: query_param(&params, "producer_id"),
                    status: query_param(&params, "status"),
                };
                serialize_future(service_result(CommissionsService::list_all(&service, search, pagination)))
            }
            (&Post, Some(Route::AdminCommissionPay { id })) => {
                info!("Received request to mark commission {} paid", id);
                serialize_future(service_result(CommissionsService::mark_paid(&service, id)))
            }
            (&Post, Some(Route::AdminCommissionsReconcile)) => serialize_future(service_result(CommissionsService::reconcile(&service))),
            (&Get, Some(Route::AdminDashboard)) => serialize_future(service_result(DashboardService::get_stats(&service))),

            // Fallback
            (m, _) => Box::new(future::err(
                format_err!("Request to non existing endpoint in eduplay service! {:?} {:?}", m, path)
                    .context(Error::NotFound)
                    .into(),
            )),
        }
    }
}
