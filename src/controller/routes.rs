use std::str::FromStr;

use crate::http::RouteParser;
use crate::models::*;

/// Listing moderation done by admins
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModerationAction {
    Approve,
    Reject,
    Unpublish,
}

impl FromStr for ModerationAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ModerationAction::Approve),
            "reject" => Ok(ModerationAction::Reject),
            "unpublish" => Ok(ModerationAction::Unpublish),
            _ => Err(()),
        }
    }
}

/// Manual order transitions done by admins
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OrderAction {
    Approve,
    Complete,
    Refund,
    Cancel,
}

impl FromStr for OrderAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(OrderAction::Approve),
            "complete" => Ok(OrderAction::Complete),
            "refund" => Ok(OrderAction::Refund),
            "cancel" => Ok(OrderAction::Cancel),
            _ => Err(()),
        }
    }
}

/// List of all routes with params for the app
#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    AuthRegister,
    AuthLogin,
    AuthMe,
    UsersMe,
    UsersMePayout,
    Products,
    ProductsMine,
    Product { id: ProductId },
    ProductSubmit { id: ProductId },
    Cart,
    CartItems,
    CartItem { product_id: ProductId },
    CartCheckout,
    CheckoutProduct { id: ProductId },
    CheckoutCombo { id: ComboId },
    Orders,
    Order { id: OrderId },
    Sales,
    MercadoPagoWebhook,
    Commissions,
    Combos,
    Combo { id: ComboId },
    OrderBumps,
    OrderBumpsByProduct { product_id: ProductId },
    OrderBump { id: OrderBumpId },
    OrderBumpActive { id: OrderBumpId },
    Apps,
    App { id: AppId },
    AppSubmit { id: AppId },
    GamificationMe,
    GamificationBadges,
    GamificationMissions,
    GamificationLeaderboard,
    AdminUsers,
    AdminUserRole { user_id: UserId },
    AdminUserStatus { user_id: UserId },
    AdminProductsPending,
    AdminProductModeration { id: ProductId, action: ModerationAction },
    AdminAppsPending,
    AdminAppModeration { id: AppId, action: ModerationAction },
    AdminOrders,
    AdminOrderAction { id: OrderId, action: OrderAction },
    AdminCommissions,
    AdminCommissionPay { id: CommissionId },
    AdminCommissionsReconcile,
    AdminDashboard,
}

fn param<T: FromStr>(params: &[&str], index: usize) -> Option<T> {
    params.get(index).and_then(|value| value.parse().ok())
}

pub fn create_route_parser() -> RouteParser<Route> {
    let mut route_parser = RouteParser::default();

    route_parser.add_route(r"^/api/v1/auth/register$", || Route::AuthRegister);
    route_parser.add_route(r"^/api/v1/auth/login$", || Route::AuthLogin);
    route_parser.add_route(r"^/api/v1/auth/me$", || Route::AuthMe);
    route_parser.add_route(r"^/api/v1/users/me$", || Route::UsersMe);
    route_parser.add_route(r"^/api/v1/users/me/payout$", || Route::UsersMePayout);

    route_parser.add_route(r"^/api/v1/products$", || Route::Products);
    route_parser.add_route(r"^/api/v1/products/mine$", || Route::ProductsMine);
    route_parser.add_route_with_params(r"^/api/v1/products/([^/]+)$", |params| {
        param(&params, 0).map(|id| Route::Product { id })
    });
    route_parser.add_route_with_params(r"^/api/v1/products/([^/]+)/submit$", |params| {
        param(&params, 0).map(|id| Route::ProductSubmit { id })
    });

    route_parser.add_route(r"^/api/v1/cart$", || Route::Cart);
    route_parser.add_route(r"^/api/v1/cart/items$", || Route::CartItems);
    route_parser.add_route_with_params(r"^/api/v1/cart/items/([^/]+)$", |params| {
        param(&params, 0).map(|product_id| Route::CartItem { product_id })
    });
    route_parser.add_route(r"^/api/v1/cart/checkout$", || Route::CartCheckout);
    route_parser.add_route_with_params(r"^/api/v1/checkout/product/([^/]+)$", |params| {
        param(&params, 0).map(|id| Route::CheckoutProduct { id })
    });
    route_parser.add_route_with_params(r"^/api/v1/checkout/combo/([^/]+)$", |params| {
        param(&params, 0).map(|id| Route::CheckoutCombo { id })
    });

    route_parser.add_route(r"^/api/v1/orders$", || Route::Orders);
    route_parser.add_route_with_params(r"^/api/v1/orders/([^/]+)$", |params| {
        param(&params, 0).map(|id| Route::Order { id })
    });
    route_parser.add_route(r"^/api/v1/sales$", || Route::Sales);
    route_parser.add_route(r"^/api/v1/webhooks/mercado-pago$", || Route::MercadoPagoWebhook);
    route_parser.add_route(r"^/api/v1/commissions$", || Route::Commissions);

    route_parser.add_route(r"^/api/v1/combos$", || Route::Combos);
    route_parser.add_route_with_params(r"^/api/v1/combos/([^/]+)$", |params| {
        param(&params, 0).map(|id| Route::Combo { id })
    });

    route_parser.add_route(r"^/api/v1/order-bumps$", || Route::OrderBumps);
    route_parser.add_route_with_params(r"^/api/v1/order-bumps/by-product/([^/]+)$", |params| {
        param(&params, 0).map(|product_id| Route::OrderBumpsByProduct { product_id })
    });
    route_parser.add_route_with_params(r"^/api/v1/order-bumps/([^/]+)$", |params| {
        param(&params, 0).map(|id| Route::OrderBump { id })
    });
    route_parser.add_route_with_params(r"^/api/v1/order-bumps/([^/]+)/active$", |params| {
        param(&params, 0).map(|id| Route::OrderBumpActive { id })
    });

    route_parser.add_route(r"^/api/v1/apps$", || Route::Apps);
    route_parser.add_route_with_params(r"^/api/v1/apps/([^/]+)$", |params| param(&params, 0).map(|id| Route::App { id }));
    route_parser.add_route_with_params(r"^/api/v1/apps/([^/]+)/submit$", |params| {
        param(&params, 0).map(|id| Route::AppSubmit { id })
    });

    route_parser.add_route(r"^/api/v1/gamification/me$", || Route::GamificationMe);
    route_parser.add_route(r"^/api/v1/gamification/badges$", || Route::GamificationBadges);
    route_parser.add_route(r"^/api/v1/gamification/missions$", || Route::GamificationMissions);
    route_parser.add_route(r"^/api/v1/gamification/leaderboard$", || Route::GamificationLeaderboard);

    route_parser.add_route(r"^/api/v1/admin/users$", || Route::AdminUsers);
    route_parser.add_route_with_params(r"^/api/v1/admin/users/([^/]+)/role$", |params| {
        param(&params, 0).map(|user_id| Route::AdminUserRole { user_id })
    });
    route_parser.add_route_with_params(r"^/api/v1/admin/users/([^/]+)/status$", |params| {
        param(&params, 0).map(|user_id| Route::AdminUserStatus { user_id })
    });
    route_parser.add_route(r"^/api/v1/admin/products/pending$", || Route::AdminProductsPending);
    route_parser.add_route_with_params(r"^/api/v1/admin/products/([^/]+)/([a-z]+)$", |params| {
        let id = param(&params, 0)?;
        let action = param(&params, 1)?;
        Some(Route::AdminProductModeration { id, action })
    });
    route_parser.add_route(r"^/api/v1/admin/apps/pending$", || Route::AdminAppsPending);
    route_parser.add_route_with_params(r"^/api/v1/admin/apps/([^/]+)/([a-z]+)$", |params| {
        let id = param(&params, 0)?;
        let action = param(&params, 1)?;
        Some(Route::AdminAppModeration { id, action })
    });
    route_parser.add_route(r"^/api/v1/admin/orders$", || Route::AdminOrders);
    route_parser.add_route_with_params(r"^/api/v1/admin/orders/([^/]+)/([a-z]+)$", |params| {
        let id = param(&params, 0)?;
        let action = param(&params, 1)?;
        Some(Route::AdminOrderAction { id, action })
    });
    route_parser.add_route(r"^/api/v1/admin/commissions$", || Route::AdminCommissions);
    route_parser.add_route(r"^/api/v1/admin/commissions/reconcile$", || Route::AdminCommissionsReconcile);
    route_parser.add_route_with_params(r"^/api/v1/admin/commissions/([^/]+)/pay$", |params| {
        param(&params, 0).map(|id| Route::AdminCommissionPay { id })
    });
    route_parser.add_route(r"^/api/v1/admin/dashboard$", || Route::AdminDashboard);

    route_parser
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "5c6c2a4e-3b1f-4a5e-9d0c-1f2e3d4c5b6a";

    fn uuid() -> uuid::Uuid {
        ID.parse().unwrap()
    }

    #[test]
    fn test_static_routes() {
        let parser = create_route_parser();
        assert_eq!(parser.test("/api/v1/auth/login"), Some(Route::AuthLogin));
        assert_eq!(parser.test("/api/v1/products/mine"), Some(Route::ProductsMine));
        assert_eq!(parser.test("/api/v1/cart/checkout"), Some(Route::CartCheckout));
        assert_eq!(parser.test("/api/v1/webhooks/mercado-pago"), Some(Route::MercadoPagoWebhook));
        assert_eq!(parser.test("/api/v1/admin/commissions/reconcile"), Some(Route::AdminCommissionsReconcile));
        assert_eq!(parser.test("/api/v1/admin/products/pending"), Some(Route::AdminProductsPending));
        assert_eq!(parser.test("/api/v1/admin/dashboard"), Some(Route::AdminDashboard));
    }

    #[test]
    fn test_routes_with_ids() {
        let parser = create_route_parser();
        assert_eq!(
            parser.test(&format!("/api/v1/products/{}", ID)),
            Some(Route::Product { id: ProductId(uuid()) })
        );
        assert_eq!(
            parser.test(&format!("/api/v1/products/{}/submit", ID)),
            Some(Route::ProductSubmit { id: ProductId(uuid()) })
        );
        assert_eq!(
            parser.test(&format!("/api/v1/order-bumps/by-product/{}", ID)),
            Some(Route::OrderBumpsByProduct {
                product_id: ProductId(uuid())
            })
        );
        assert_eq!(
            parser.test(&format!("/api/v1/admin/orders/{}/refund", ID)),
            Some(Route::AdminOrderAction {
                id: OrderId(uuid()),
                action: OrderAction::Refund,
            })
        );
        assert_eq!(
            parser.test(&format!("/api/v1/admin/apps/{}/reject", ID)),
            Some(Route::AdminAppModeration {
                id: AppId(uuid()),
                action: ModerationAction::Reject,
            })
        );
    }

    #[test]
    fn test_rejects_malformed_routes() {
        let parser = create_route_parser();
        assert_eq!(parser.test("/api/v1/products/not-an-id"), None);
        assert_eq!(parser.test(&format!("/api/v1/admin/orders/{}/ship", ID)), None);
        assert_eq!(parser.test(&format!("/api/v1/admin/products/{}/complete", ID)), None);
        assert_eq!(parser.test("/products"), None);
        assert_eq!(parser.test("/api/v2/products"), None);
    }
}
