use std::sync::Arc;

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;

use crate::models::*;
use crate::repos::*;

pub trait ReposFactory<C>: Clone + Send + Sync + 'static
where
    C: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
{
    fn create_users_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn UsersRepo + 'a>;
    fn create_users_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn UsersRepo + 'a>;
    fn create_products_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn ProductsRepo + 'a>;
    fn create_products_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn ProductsRepo + 'a>;
    fn create_orders_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn OrdersRepo + 'a>;
    fn create_orders_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn OrdersRepo + 'a>;
    fn create_commissions_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn CommissionsRepo + 'a>;
    fn create_commissions_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn CommissionsRepo + 'a>;
    fn create_cart_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn CartRepo + 'a>;
    fn create_combos_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn CombosRepo + 'a>;
    fn create_combos_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn CombosRepo + 'a>;
    fn create_order_bumps_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn OrderBumpsRepo + 'a>;
    fn create_order_bumps_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn OrderBumpsRepo + 'a>;
    fn create_apps_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn AppsRepo + 'a>;
    fn create_gamification_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn GamificationRepo + 'a>;
    fn create_gamification_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn GamificationRepo + 'a>;
}

#[derive(Clone)]
pub struct ReposFactoryImpl {
    roles_cache: Arc<RolesCacheImpl>,
}

impl ReposFactoryImpl {
    pub fn new(roles_cache: RolesCacheImpl) -> Self {
        Self {
            roles_cache: Arc::new(roles_cache),
        }
    }

    /// Role of an active user. Suspended and unknown users get no role.
    pub fn get_role<C: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static>(
        &self,
        user_id: UserId,
        db_conn: &C,
    ) -> Option<Role> {
        if let Some(role) = self.roles_cache.get(user_id) {
            return Some(role);
        }

        let users_repo = UsersRepoImpl::new(db_conn, Box::new(SystemAcl::default()), self.roles_cache.clone());
        match users_repo.get(user_id) {
            Ok(Some(ref user)) if user.is_active() => {
                self.roles_cache.add_role(user_id, user.role);
                Some(user.role)
            }
            Ok(_) => None,
            Err(e) => {
                error!("Failed to fetch role of user {}: {}", user_id, e);
                None
            }
        }
    }

    fn get_acl<T, C: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static>(
        &self,
        db_conn: &C,
        user_id: Option<UserId>,
    ) -> Box<dyn Acl<T>> {
        user_id
            .and_then(|id| self.get_role(id, db_conn).map(|role| (id, role)))
            .map(|(id, role)| Box::new(ApplicationAcl::new(role, id)) as Box<dyn Acl<T>>)
            .unwrap_or_else(|| Box::new(UnauthorizedAcl::default()) as Box<dyn Acl<T>>)
    }
}

impl<C> ReposFactory<C> for ReposFactoryImpl
where
    C: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
{
    fn create_users_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn UsersRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(UsersRepoImpl::new(db_conn, acl, self.roles_cache.clone())) as Box<dyn UsersRepo>
    }

    fn create_users_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn UsersRepo + 'a> {
        Box::new(UsersRepoImpl::new(
            db_conn,
            Box::new(SystemAcl::default()) as Box<dyn Acl<User>>,
            self.roles_cache.clone(),
        )) as Box<dyn UsersRepo>
    }

    fn create_products_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn ProductsRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(ProductsRepoImpl::new(db_conn, acl)) as Box<dyn ProductsRepo>
    }

    fn create_products_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn ProductsRepo + 'a> {
        Box::new(ProductsRepoImpl::new(db_conn, Box::new(SystemAcl::default()) as Box<dyn Acl<Product>>)) as Box<dyn ProductsRepo>
    }

    fn create_orders_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn OrdersRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(OrdersRepoImpl::new(db_conn, acl)) as Box<dyn OrdersRepo>
    }

    fn create_orders_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn OrdersRepo + 'a> {
        Box::new(OrdersRepoImpl::new(db_conn, Box::new(SystemAcl::default()) as Box<dyn Acl<Order>>)) as Box<dyn OrdersRepo>
    }

    fn create_commissions_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn CommissionsRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(CommissionsRepoImpl::new(db_conn, acl)) as Box<dyn CommissionsRepo>
    }

    fn create_commissions_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn CommissionsRepo + 'a> {
        Box::new(CommissionsRepoImpl::new(
            db_conn,
            Box::new(SystemAcl::default()) as Box<dyn Acl<Commission>>,
        )) as Box<dyn CommissionsRepo>
    }

    fn create_cart_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn CartRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(CartRepoImpl::new(db_conn, acl)) as Box<dyn CartRepo>
    }

    fn create_combos_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn CombosRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(CombosRepoImpl::new(db_conn, acl)) as Box<dyn CombosRepo>
    }

    fn create_combos_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn CombosRepo + 'a> {
        Box::new(CombosRepoImpl::new(db_conn, Box::new(SystemAcl::default()) as Box<dyn Acl<Combo>>)) as Box<dyn CombosRepo>
    }

    fn create_order_bumps_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn OrderBumpsRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(OrderBumpsRepoImpl::new(db_conn, acl)) as Box<dyn OrderBumpsRepo>
    }

    fn create_order_bumps_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn OrderBumpsRepo + 'a> {
        Box::new(OrderBumpsRepoImpl::new(
            db_conn,
            Box::new(SystemAcl::default()) as Box<dyn Acl<OrderBump>>,
        )) as Box<dyn OrderBumpsRepo>
    }

    fn create_apps_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn AppsRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(AppsRepoImpl::new(db_conn, acl)) as Box<dyn AppsRepo>
    }

    fn create_gamification_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<dyn GamificationRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(GamificationRepoImpl::new(db_conn, acl)) as Box<dyn GamificationRepo>
    }

    fn create_gamification_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<dyn GamificationRepo + 'a> {
        Box::new(GamificationRepoImpl::new(
            db_conn,
            Box::new(SystemAcl::default()) as Box<dyn Acl<UserGamification>>,
        )) as Box<dyn GamificationRepo>
    }
}

#[cfg(test)]
pub mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use diesel::connection::{AnsiTransactionManager, SimpleConnection};
    use diesel::deserialize::QueryableByName;
    use diesel::pg::Pg;
    use diesel::query_builder::{AsQuery, QueryFragment, QueryId};
    use diesel::sql_types::HasSqlType;
    use diesel::{Connection, ConnectionResult, QueryResult, Queryable};
    use futures_cpupool::CpuPool;
    use r2d2::ManageConnection;
    use uuid::Uuid;

    use crate::client::email::mock::EmailClientMock;
    use crate::client::mercado_pago::mock::MercadoPagoClientMock;
    use crate::config::Config;
    use crate::controller::context::{DynamicContext, StaticContext};
    use crate::models::*;
    use crate::repos::*;
    use crate::services::Service;

    pub const PASSWORD: &str = "correct horse battery";

    fn fixed_uuid(n: u32) -> Uuid {
        Uuid::parse_str(&format!("00000000-0000-0000-0000-{:012}", n)).unwrap()
    }

    pub fn admin_id() -> UserId {
        UserId::new(fixed_uuid(1))
    }

    pub fn producer_id() -> UserId {
        UserId::new(fixed_uuid(2))
    }

    pub fn buyer_id() -> UserId {
        UserId::new(fixed_uuid(3))
    }

    pub fn suspended_id() -> UserId {
        UserId::new(fixed_uuid(4))
    }

    pub fn other_producer_id() -> UserId {
        UserId::new(fixed_uuid(5))
    }

    pub fn draft_product_id() -> ProductId {
        ProductId::new(fixed_uuid(10))
    }

    pub fn pending_product_id() -> ProductId {
        ProductId::new(fixed_uuid(11))
    }

    pub fn published_product_id() -> ProductId {
        ProductId::new(fixed_uuid(12))
    }

    pub fn second_published_product_id() -> ProductId {
        ProductId::new(fixed_uuid(13))
    }

    pub fn purchased_product_id() -> ProductId {
        ProductId::new(fixed_uuid(14))
    }

    pub fn foreign_product_id() -> ProductId {
        ProductId::new(fixed_uuid(15))
    }

    pub fn missing_product_id() -> ProductId {
        ProductId::new(fixed_uuid(19))
    }

    pub fn combo_id() -> ComboId {
        ComboId::new(fixed_uuid(20))
    }

    /// Combo that still lists a product waiting for moderation
    pub fn unlisted_combo_id() -> ComboId {
        ComboId::new(fixed_uuid(21))
    }

    /// Combo containing a product the test buyer already owns
    pub fn owned_combo_id() -> ComboId {
        ComboId::new(fixed_uuid(22))
    }

    pub fn order_bump_id() -> OrderBumpId {
        OrderBumpId::new(fixed_uuid(30))
    }

    pub fn app_id() -> AppId {
        AppId::new(fixed_uuid(40))
    }

    pub fn pending_app_id() -> AppId {
        AppId::new(fixed_uuid(41))
    }

    pub fn published_app_id() -> AppId {
        AppId::new(fixed_uuid(42))
    }

    pub const PRODUCT_PRICE: u64 = 10_000;

    pub fn create_user(id: UserId) -> User {
        let now = Utc::now().naive_utc();
        let (role, status) = if id == admin_id() {
            (Role::Admin, UserStatus::Active)
        } else if id == producer_id() || id == other_producer_id() {
            (Role::Producer, UserStatus::Active)
        } else if id == suspended_id() {
            (Role::Buyer, UserStatus::Suspended)
        } else {
            (Role::Buyer, UserStatus::Active)
        };
        User {
            id,
            email: format!("{}@eduplay.test", id),
            password_hash: hash_password(PASSWORD, 2),
            name: "Test user".to_string(),
            role,
            status,
            pix_key: None,
            bank_name: None,
            bank_agency: None,
            bank_account: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn create_product(id: ProductId) -> Product {
        let now = Utc::now().naive_utc();
        let status = if id == draft_product_id() {
            ListingStatus::Draft
        } else if id == pending_product_id() {
            ListingStatus::PendingApproval
        } else {
            ListingStatus::Published
        };
        let producer_id = if id == foreign_product_id() { other_producer_id() } else { producer_id() };
        Product {
            id,
            producer_id,
            title: "Rust for beginners".to_string(),
            description: "Course".to_string(),
            kind: ProductKind::Course,
            price: Amount::new(PRODUCT_PRICE),
            status,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn create_order(payload: NewOrder) -> Order {
        let now = Utc::now().naive_utc();
        let NewOrder {
            id,
            checkout_id,
            buyer_id,
            producer_id,
            product_id,
            combo_id,
            order_bump_id,
            amount,
            platform_fee,
            producer_amount,
            rate_bps,
            status,
            payment_status,
        } = payload;
        Order {
            id,
            checkout_id,
            buyer_id,
            producer_id,
            product_id,
            combo_id,
            order_bump_id,
            amount,
            platform_fee,
            producer_amount,
            rate_bps,
            status,
            payment_status,
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending order of the test buyer for a published product
    pub fn create_pending_order(checkout_id: CheckoutId) -> Order {
        let amount = Amount::new(PRODUCT_PRICE);
        let split = CommissionSplit::calculate(amount, DEFAULT_COMMISSION_RATE_BPS).unwrap();
        create_order(NewOrder::new(
            checkout_id,
            buyer_id(),
            producer_id(),
            OrderItem::Product(published_product_id()),
            amount,
            split,
        ))
    }

    /// Pending commission for `order` as the payment webhook creates it
    pub fn create_commission(order: &Order) -> Commission {
        let payload = NewCommission::for_order(order);
        Commission {
            id: payload.id,
            order_id: payload.order_id,
            producer_id: payload.producer_id,
            amount: payload.amount,
            rate_bps: payload.rate_bps,
            status: payload.status,
            created_at: Utc::now().naive_utc(),
            paid_at: None,
        }
    }

    fn create_combo(id: ComboId) -> Combo {
        let now = Utc::now().naive_utc();
        Combo {
            id,
            producer_id: producer_id(),
            title: "Bundle".to_string(),
            description: String::new(),
            price: Amount::new(15_000),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn create_order_bump(id: OrderBumpId) -> OrderBump {
        OrderBump {
            id,
            product_id: published_product_id(),
            offer_product_id: second_published_product_id(),
            producer_id: producer_id(),
            headline: "Take the e-book too".to_string(),
            price: Amount::new(4_990),
            active: true,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn create_app(id: AppId) -> App {
        let now = Utc::now().naive_utc();
        let status = if id == pending_app_id() {
            ListingStatus::PendingApproval
        } else if id == published_app_id() {
            ListingStatus::Published
        } else {
            ListingStatus::Draft
        };
        App {
            id,
            producer_id: producer_id(),
            name: "Flashcards".to_string(),
            description: String::new(),
            platform: AppPlatform::Android,
            download_url: "https://apps.eduplay.test/flashcards.apk".to_string(),
            price: Amount::new(1_990),
            status,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rows kept by the stateful mocks
    #[derive(Default)]
    pub struct MockState {
        pub orders: HashMap<OrderId, Order>,
        pub commissions: HashMap<OrderId, Commission>,
        pub cart: Vec<CartItem>,
        pub points: HashMap<UserId, i32>,
        pub awarded_badges: Vec<(UserId, BadgeId)>,
        pub missions: HashMap<(UserId, MissionId), UserMission>,
    }

    #[derive(Default, Clone)]
    pub struct ReposFactoryMock {
        pub state: Arc<Mutex<MockState>>,
    }

    impl ReposFactoryMock {
        pub fn add_order(&self, order: Order) {
            self.state.lock().unwrap().orders.insert(order.id, order);
        }

        pub fn order(&self, order_id: OrderId) -> Option<Order> {
            self.state.lock().unwrap().orders.get(&order_id).cloned()
        }

        pub fn commissions_count(&self) -> usize {
            self.state.lock().unwrap().commissions.len()
        }

        pub fn commission(&self, order_id: OrderId) -> Option<Commission> {
            self.state.lock().unwrap().commissions.get(&order_id).cloned()
        }

        pub fn points(&self, user_id: UserId) -> i32 {
            self.state.lock().unwrap().points.get(&user_id).cloned().unwrap_or(0)
        }

        pub fn add_commission(&self, commission: Commission) {
            self.state.lock().unwrap().commissions.insert(commission.order_id, commission);
        }
    }

    impl<C: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ReposFactory<C> for ReposFactoryMock {
        fn create_users_repo<'a>(&self, _db_conn: &'a C, _user_id: Option<UserId>) -> Box<dyn UsersRepo + 'a> {
            Box::new(UsersRepoMock::default())
        }

        fn create_users_repo_with_sys_acl<'a>(&self, _db_conn: &'a C) -> Box<dyn UsersRepo + 'a> {
            Box::new(UsersRepoMock::default())
        }

        fn create_products_repo<'a>(&self, _db_conn: &'a C, _user_id: Option<UserId>) -> Box<dyn ProductsRepo + 'a> {
            Box::new(ProductsRepoMock::default())
        }

        fn create_products_repo_with_sys_acl<'a>(&self, _db_conn: &'a C) -> Box<dyn ProductsRepo + 'a> {
            Box::new(ProductsRepoMock::default())
        }

        fn create_orders_repo<'a>(&self, _db_conn: &'a C, _user_id: Option<UserId>) -> Box<dyn OrdersRepo + 'a> {
            Box::new(OrdersRepoMock { state: self.state.clone() })
        }

        fn create_orders_repo_with_sys_acl<'a>(&self, _db_conn: &'a C) -> Box<dyn OrdersRepo + 'a> {
            Box::new(OrdersRepoMock { state: self.state.clone() })
        }

        fn create_commissions_repo<'a>(&self, _db_conn: &'a C, _user_id: Option<UserId>) -> Box<dyn CommissionsRepo + 'a> {
            Box::new(CommissionsRepoMock { state: self.state.clone() })
        }

        fn create_commissions_repo_with_sys_acl<'a>(&self, _db_conn: &'a C) -> Box<dyn CommissionsRepo + 'a> {
            Box::new(CommissionsRepoMock { state: self.state.clone() })
        }

        fn create_cart_repo<'a>(&self, _db_conn: &'a C, _user_id: Option<UserId>) -> Box<dyn CartRepo + 'a> {
            Box::new(CartRepoMock { state: self.state.clone() })
        }

        fn create_combos_repo<'a>(&self, _db_conn: &'a C, _user_id: Option<UserId>) -> Box<dyn CombosRepo + 'a> {
            Box::new(CombosRepoMock::default())
        }

        fn create_combos_repo_with_sys_acl<'a>(&self, _db_conn: &'a C) -> Box<dyn CombosRepo + 'a> {
            Box::new(CombosRepoMock::default())
        }

        fn create_order_bumps_repo<'a>(&self, _db_conn: &'a C, _user_id: Option<UserId>) -> Box<dyn OrderBumpsRepo + 'a> {
            Box::new(OrderBumpsRepoMock::default())
        }

        fn create_order_bumps_repo_with_sys_acl<'a>(&self, _db_conn: &'a C) -> Box<dyn OrderBumpsRepo + 'a> {
            Box::new(OrderBumpsRepoMock::default())
        }

        fn create_apps_repo<'a>(&self, _db_conn: &'a C, _user_id: Option<UserId>) -> Box<dyn AppsRepo + 'a> {
            Box::new(AppsRepoMock::default())
        }

        fn create_gamification_repo<'a>(&self, _db_conn: &'a C, _user_id: Option<UserId>) -> Box<dyn GamificationRepo + 'a> {
            Box::new(GamificationRepoMock { state: self.state.clone() })
        }

        fn create_gamification_repo_with_sys_acl<'a>(&self, _db_conn: &'a C) -> Box<dyn GamificationRepo + 'a> {
            Box::new(GamificationRepoMock { state: self.state.clone() })
        }
    }

    #[derive(Clone, Default)]
    pub struct UsersRepoMock;

    impl UsersRepo for UsersRepoMock {
        fn get(&self, user_id: UserId) -> RepoResult<Option<User>> {
            Ok(Some(create_user(user_id)))
        }

        fn get_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let user = match email {
                "buyer@eduplay.test" => Some(create_user(buyer_id())),
                "producer@eduplay.test" => Some(create_user(producer_id())),
                "suspended@eduplay.test" => Some(create_user(suspended_id())),
                _ => None,
            };
            Ok(user.map(|user| User {
                email: email.to_string(),
                ..user
            }))
        }

        fn create(&self, payload: NewUser) -> RepoResult<User> {
            let user = create_user(payload.id);
            Ok(User {
                id: payload.id,
                email: payload.email,
                password_hash: payload.password_hash,
                name: payload.name,
                role: payload.role,
                status: payload.status,
                ..user
            })
        }

        fn update(&self, user_id: UserId, payload: UpdateUser) -> RepoResult<User> {
            let user = create_user(user_id);
            Ok(User {
                name: payload.name.unwrap_or(user.name.clone()),
                pix_key: payload.pix_key,
                bank_name: payload.bank_name,
                bank_agency: payload.bank_agency,
                bank_account: payload.bank_account,
                ..user
            })
        }

        fn set_role(&self, user_id: UserId, role: Role) -> RepoResult<User> {
            Ok(User {
                role,
                ..create_user(user_id)
            })
        }

        fn set_status(&self, user_id: UserId, status: UserStatus) -> RepoResult<User> {
            Ok(User {
                status,
                ..create_user(user_id)
            })
        }

        fn list(&self, _search: UsersSearch, _pagination: Pagination) -> RepoResult<Vec<User>> {
            Ok(vec![create_user(buyer_id()), create_user(producer_id())])
        }

        fn count_by_role(&self, role: Role) -> RepoResult<i64> {
            Ok(match role {
                Role::Admin => 1,
                Role::Producer => 2,
                Role::Buyer => 3,
            })
        }
    }

    #[derive(Clone, Default)]
    pub struct ProductsRepoMock;

    impl ProductsRepo for ProductsRepoMock {
        fn get(&self, product_id: ProductId) -> RepoResult<Option<Product>> {
            if product_id == missing_product_id() {
                return Ok(None);
            }
            Ok(Some(create_product(product_id)))
        }

        fn list(&self, search: ProductsSearch, _pagination: Pagination) -> RepoResult<Vec<Product>> {
            let product = create_product(published_product_id());
            Ok(vec![Product {
                status: search.status.unwrap_or(product.status),
                ..product
            }])
        }

        fn list_by_ids(&self, product_ids: &[ProductId]) -> RepoResult<Vec<Product>> {
            Ok(product_ids
                .iter()
                .filter(|id| **id != missing_product_id())
                .map(|id| create_product(*id))
                .collect())
        }

        fn create(&self, payload: NewProduct) -> RepoResult<Product> {
            let product = create_product(payload.id);
            Ok(Product {
                id: payload.id,
                producer_id: payload.producer_id,
                title: payload.title,
                description: payload.description,
                kind: payload.kind,
                price: payload.price,
                status: payload.status,
                ..product
            })
        }

        fn update(&self, product_id: ProductId, payload: UpdateProduct) -> RepoResult<Product> {
            let product = create_product(product_id);
            Ok(Product {
                title: payload.title.unwrap_or(product.title.clone()),
                price: payload.price.unwrap_or(product.price),
                ..product
            })
        }

        fn set_status(&self, product_id: ProductId, status: ListingStatus, rejection_reason: Option<String>) -> RepoResult<Product> {
            Ok(Product {
                status,
                rejection_reason,
                ..create_product(product_id)
            })
        }

        fn delete(&self, product_id: ProductId) -> RepoResult<Product> {
            Ok(create_product(product_id))
        }

        fn count_by_status(&self, _status: ListingStatus) -> RepoResult<i64> {
            Ok(4)
        }
    }

    pub struct OrdersRepoMock {
        state: Arc<Mutex<MockState>>,
    }

    impl OrdersRepo for OrdersRepoMock {
        fn get(&self, order_id: OrderId) -> RepoResult<Option<Order>> {
            Ok(self.state.lock().unwrap().orders.get(&order_id).cloned())
        }

        fn list(&self, search: OrdersSearch, pagination: Pagination) -> RepoResult<Vec<Order>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .orders
                .values()
                .filter(|order| search.buyer_id.map(|id| order.buyer_id == id).unwrap_or(true))
                .filter(|order| search.producer_id.map(|id| order.producer_id == id).unwrap_or(true))
                .filter(|order| search.checkout_id.map(|id| order.checkout_id == id).unwrap_or(true))
                .filter(|order| search.status.map(|status| order.status == status).unwrap_or(true))
                .skip(pagination.skip as usize)
                .take(pagination.count as usize)
                .cloned()
                .collect())
        }

        fn list_by_checkout(&self, checkout_id: CheckoutId) -> RepoResult<Vec<Order>> {
            let state = self.state.lock().unwrap();
            Ok(state.orders.values().filter(|order| order.checkout_id == checkout_id).cloned().collect())
        }

        fn create_many(&self, payload: Vec<NewOrder>) -> RepoResult<Vec<Order>> {
            let mut state = self.state.lock().unwrap();
            let orders = payload.into_iter().map(create_order).collect::<Vec<_>>();
            for order in &orders {
                state.orders.insert(order.id, order.clone());
            }
            Ok(orders)
        }

        fn update_status(
            &self,
            order_id: OrderId,
            from: OrderStatus,
            status: OrderStatus,
            payment_status: PaymentStatus,
            payment_id: Option<String>,
        ) -> RepoResult<Option<Order>> {
            let mut state = self.state.lock().unwrap();
            Ok(state.orders.get_mut(&order_id).filter(|order| order.status == from).map(|order| {
                order.status = status;
                order.payment_status = payment_status;
                if payment_id.is_some() {
                    order.payment_id = payment_id;
                }
                order.clone()
            }))
        }

        fn list_paid_without_commission(&self, limit: i64) -> RepoResult<Vec<Order>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .orders
                .values()
                .filter(|order| order.status.is_paid() && !state.commissions.contains_key(&order.id))
                .take(limit as usize)
                .cloned()
                .collect())
        }

        fn has_purchased(&self, _buyer_id: UserId, product_id: ProductId) -> RepoResult<bool> {
            Ok(product_id == purchased_product_id())
        }

        fn purchased_product_ids(&self, _buyer_id: UserId) -> RepoResult<Vec<ProductId>> {
            Ok(vec![purchased_product_id()])
        }

        fn count_by_status(&self, status: OrderStatus) -> RepoResult<i64> {
            let state = self.state.lock().unwrap();
            Ok(state.orders.values().filter(|order| order.status == status).count() as i64)
        }

        fn paid_totals(&self) -> RepoResult<OrderTotals> {
            Ok(OrderTotals {
                gross: Amount::new(PRODUCT_PRICE),
                platform_fees: Amount::new(300),
            })
        }
    }

    pub struct CommissionsRepoMock {
        state: Arc<Mutex<MockState>>,
    }

    impl CommissionsRepo for CommissionsRepoMock {
        fn get(&self, commission_id: CommissionId) -> RepoResult<Option<Commission>> {
            let state = self.state.lock().unwrap();
            Ok(state.commissions.values().find(|c| c.id == commission_id).cloned())
        }

        fn get_by_order(&self, order_id: OrderId) -> RepoResult<Option<Commission>> {
            Ok(self.state.lock().unwrap().commissions.get(&order_id).cloned())
        }

        fn list(&self, search: CommissionsSearch, pagination: Pagination) -> RepoResult<Vec<Commission>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .commissions
                .values()
                .filter(|c| search.producer_id.map(|id| c.producer_id == id).unwrap_or(true))
                .filter(|c| search.status.map(|status| c.status == status).unwrap_or(true))
                .skip(pagination.skip as usize)
                .take(pagination.count as usize)
                .cloned()
                .collect())
        }

        fn totals(&self, search: CommissionsSearch) -> RepoResult<CommissionTotals> {
            let state = self.state.lock().unwrap();
            let total = |status: CommissionStatus| {
                Amount::checked_sum(
                    state
                        .commissions
                        .values()
                        .filter(|c| search.producer_id.map(|id| c.producer_id == id).unwrap_or(true))
                        .filter(|c| c.status == status)
                        .map(|c| c.amount),
                )
                .unwrap_or_default()
            };
            Ok(CommissionTotals {
                total_pending: total(CommissionStatus::Pending),
                total_paid: total(CommissionStatus::Paid),
            })
        }

        fn create_if_missing(&self, payload: NewCommission) -> RepoResult<Option<Commission>> {
            let mut state = self.state.lock().unwrap();
            if state.commissions.contains_key(&payload.order_id) {
                return Ok(None);
            }
            let commission = Commission {
                id: payload.id,
                order_id: payload.order_id,
                producer_id: payload.producer_id,
                amount: payload.amount,
                rate_bps: payload.rate_bps,
                status: payload.status,
                created_at: Utc::now().naive_utc(),
                paid_at: None,
            };
            state.commissions.insert(payload.order_id, commission.clone());
            Ok(Some(commission))
        }

        fn set_status(&self, commission_id: CommissionId, from: CommissionStatus, status: CommissionStatus) -> RepoResult<Option<Commission>> {
            let mut state = self.state.lock().unwrap();
            Ok(state
                .commissions
                .values_mut()
                .find(|c| c.id == commission_id && c.status == from)
                .map(|commission| {
                    commission.status = status;
                    if status == CommissionStatus::Paid {
                        commission.paid_at = Some(Utc::now().naive_utc());
                    }
                    commission.clone()
                }))
        }

        fn cancel_for_order(&self, order_id: OrderId) -> RepoResult<Option<Commission>> {
            let mut state = self.state.lock().unwrap();
            Ok(state.commissions.get_mut(&order_id).and_then(|commission| {
                if commission.status == CommissionStatus::Pending {
                    commission.status = CommissionStatus::Cancelled;
                    Some(commission.clone())
                } else {
                    None
                }
            }))
        }

        fn total_by_status(&self, status: CommissionStatus) -> RepoResult<Amount> {
            let state = self.state.lock().unwrap();
            Ok(Amount::checked_sum(state.commissions.values().filter(|c| c.status == status).map(|c| c.amount)).unwrap_or_default())
        }
    }

    pub struct CartRepoMock {
        state: Arc<Mutex<MockState>>,
    }

    impl CartRepo for CartRepoMock {
        fn list(&self, user_id: UserId) -> RepoResult<Vec<CartItem>> {
            let state = self.state.lock().unwrap();
            Ok(state.cart.iter().filter(|item| item.user_id == user_id).cloned().collect())
        }

        fn add(&self, payload: NewCartItem) -> RepoResult<CartItem> {
            let mut state = self.state.lock().unwrap();
            if state
                .cart
                .iter()
                .any(|item| item.user_id == payload.user_id && item.product_id == payload.product_id)
            {
                return Err(constraint_violation("not_unique", "already in cart").into());
            }
            let item = CartItem {
                id: payload.id,
                user_id: payload.user_id,
                product_id: payload.product_id,
                created_at: Utc::now().naive_utc(),
            };
            state.cart.push(item.clone());
            Ok(item)
        }

        fn remove(&self, user_id: UserId, product_id: ProductId) -> RepoResult<Option<CartItem>> {
            let mut state = self.state.lock().unwrap();
            let position = state
                .cart
                .iter()
                .position(|item| item.user_id == user_id && item.product_id == product_id);
            Ok(position.map(|position| state.cart.remove(position)))
        }

        fn clear(&self, user_id: UserId) -> RepoResult<Vec<CartItem>> {
            let mut state = self.state.lock().unwrap();
            let (removed, kept): (Vec<CartItem>, Vec<CartItem>) = state.cart.drain(..).partition(|item| item.user_id == user_id);
            state.cart = kept;
            Ok(removed)
        }
    }

    #[derive(Clone, Default)]
    pub struct CombosRepoMock;

    impl CombosRepo for CombosRepoMock {
        fn get(&self, combo_id: ComboId) -> RepoResult<Option<Combo>> {
            Ok(Some(create_combo(combo_id)))
        }

        fn list(&self, _search: CombosSearch, _pagination: Pagination) -> RepoResult<Vec<Combo>> {
            Ok(vec![create_combo(combo_id())])
        }

        fn product_ids(&self, combo_id: ComboId) -> RepoResult<Vec<ProductId>> {
            if combo_id == unlisted_combo_id() {
                Ok(vec![published_product_id(), pending_product_id()])
            } else if combo_id == owned_combo_id() {
                Ok(vec![published_product_id(), purchased_product_id()])
            } else {
                Ok(vec![published_product_id(), second_published_product_id()])
            }
        }

        fn create(&self, payload: NewCombo, _product_ids: Vec<ProductId>) -> RepoResult<Combo> {
            Ok(Combo {
                id: payload.id,
                producer_id: payload.producer_id,
                title: payload.title,
                description: payload.description,
                price: payload.price,
                active: payload.active,
                ..create_combo(payload.id)
            })
        }

        fn update(&self, combo_id: ComboId, payload: UpdateCombo) -> RepoResult<Combo> {
            let combo = create_combo(combo_id);
            Ok(Combo {
                price: payload.price.unwrap_or(combo.price),
                active: payload.active.unwrap_or(combo.active),
                ..combo
            })
        }

        fn delete(&self, combo_id: ComboId) -> RepoResult<Combo> {
            Ok(create_combo(combo_id))
        }
    }

    #[derive(Clone, Default)]
    pub struct OrderBumpsRepoMock;

    impl OrderBumpsRepo for OrderBumpsRepoMock {
        fn get(&self, order_bump_id: OrderBumpId) -> RepoResult<Option<OrderBump>> {
            Ok(Some(create_order_bump(order_bump_id)))
        }

        fn list_by_product(&self, product_id: ProductId, _active_only: bool) -> RepoResult<Vec<OrderBump>> {
            Ok(vec![OrderBump {
                product_id,
                ..create_order_bump(order_bump_id())
            }])
        }

        fn list_by_ids(&self, ids: &[OrderBumpId]) -> RepoResult<Vec<OrderBump>> {
            Ok(ids.iter().map(|id| create_order_bump(*id)).collect())
        }

        fn create(&self, payload: NewOrderBump) -> RepoResult<OrderBump> {
            Ok(OrderBump {
                id: payload.id,
                product_id: payload.product_id,
                offer_product_id: payload.offer_product_id,
                producer_id: payload.producer_id,
                headline: payload.headline,
                price: payload.price,
                active: payload.active,
                created_at: Utc::now().naive_utc(),
            })
        }

        fn set_active(&self, order_bump_id: OrderBumpId, active: bool) -> RepoResult<OrderBump> {
            Ok(OrderBump {
                active,
                ..create_order_bump(order_bump_id)
            })
        }

        fn delete(&self, order_bump_id: OrderBumpId) -> RepoResult<OrderBump> {
            Ok(create_order_bump(order_bump_id))
        }
    }

    #[derive(Clone, Default)]
    pub struct AppsRepoMock;

    impl AppsRepo for AppsRepoMock {
        fn get(&self, app_id: AppId) -> RepoResult<Option<App>> {
            Ok(Some(create_app(app_id)))
        }

        fn list(&self, _search: AppsSearch, _pagination: Pagination) -> RepoResult<Vec<App>> {
            Ok(vec![create_app(app_id())])
        }

        fn create(&self, payload: NewApp) -> RepoResult<App> {
            Ok(App {
                id: payload.id,
                producer_id: payload.producer_id,
                name: payload.name,
                description: payload.description,
                platform: payload.platform,
                download_url: payload.download_url,
                price: payload.price,
                status: payload.status,
                ..create_app(payload.id)
            })
        }

        fn update(&self, app_id: AppId, payload: UpdateApp) -> RepoResult<App> {
            let app = create_app(app_id);
            Ok(App {
                name: payload.name.unwrap_or(app.name.clone()),
                ..app
            })
        }

        fn set_status(&self, app_id: AppId, status: ListingStatus, rejection_reason: Option<String>) -> RepoResult<App> {
            Ok(App {
                status,
                rejection_reason,
                ..create_app(app_id)
            })
        }

        fn delete(&self, app_id: AppId) -> RepoResult<App> {
            Ok(create_app(app_id))
        }
    }

    pub fn purchase_mission() -> Mission {
        Mission {
            id: MissionId::new(fixed_uuid(50)),
            code: "first_purchase".to_string(),
            title: "First purchase".to_string(),
            description: String::new(),
            kind: MissionKind::Purchase,
            target: 1,
            reward_points: 50,
        }
    }

    pub fn starter_badge() -> Badge {
        Badge {
            id: BadgeId::new(fixed_uuid(60)),
            code: "starter".to_string(),
            name: "Starter".to_string(),
            description: String::new(),
            points_required: 100,
        }
    }

    pub struct GamificationRepoMock {
        state: Arc<Mutex<MockState>>,
    }

    impl GamificationRepo for GamificationRepoMock {
        fn get_state(&self, user_id: UserId) -> RepoResult<Option<UserGamification>> {
            let state = self.state.lock().unwrap();
            Ok(state.points.get(&user_id).map(|points| UserGamification {
                user_id,
                points: *points,
                level: level_for_points(*points),
                updated_at: Utc::now().naive_utc(),
            }))
        }

        fn add_points(&self, user_id: UserId, points: i32) -> RepoResult<UserGamification> {
            let mut state = self.state.lock().unwrap();
            let total = {
                let entry = state.points.entry(user_id).or_insert(0);
                *entry += points;
                *entry
            };
            Ok(UserGamification {
                user_id,
                points: total,
                level: level_for_points(total),
                updated_at: Utc::now().naive_utc(),
            })
        }

        fn list_badges(&self) -> RepoResult<Vec<Badge>> {
            Ok(vec![starter_badge()])
        }

        fn user_badges(&self, user_id: UserId) -> RepoResult<Vec<Badge>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .awarded_badges
                .iter()
                .filter(|(owner, _)| *owner == user_id)
                .map(|_| starter_badge())
                .collect())
        }

        fn award_badges(&self, user_id: UserId, badge_ids: Vec<BadgeId>) -> RepoResult<Vec<UserBadge>> {
            let mut state = self.state.lock().unwrap();
            let mut awarded = vec![];
            for badge_id in badge_ids {
                if !state.awarded_badges.contains(&(user_id, badge_id)) {
                    state.awarded_badges.push((user_id, badge_id));
                    awarded.push(UserBadge {
                        user_id,
                        badge_id,
                        awarded_at: Utc::now().naive_utc(),
                    });
                }
            }
            Ok(awarded)
        }

        fn list_missions(&self, kind: Option<MissionKind>) -> RepoResult<Vec<Mission>> {
            let mission = purchase_mission();
            Ok(match kind {
                Some(kind) if kind != mission.kind => vec![],
                _ => vec![mission],
            })
        }

        fn user_missions(&self, user_id: UserId) -> RepoResult<Vec<UserMission>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .missions
                .values()
                .filter(|mission| mission.user_id == user_id)
                .cloned()
                .collect())
        }

        fn save_mission_progress(&self, payload: UserMission) -> RepoResult<UserMission> {
            let mut state = self.state.lock().unwrap();
            state.missions.insert((payload.user_id, payload.mission_id), payload.clone());
            Ok(payload)
        }

        fn leaderboard(&self, limit: i64) -> RepoResult<Vec<LeaderboardEntry>> {
            let state = self.state.lock().unwrap();
            let mut entries = state
                .points
                .iter()
                .map(|(user_id, points)| LeaderboardEntry {
                    user_id: *user_id,
                    name: "Test user".to_string(),
                    points: *points,
                    level: level_for_points(*points),
                })
                .collect::<Vec<_>>();
            entries.sort_by(|a, b| b.points.cmp(&a.points));
            entries.truncate(limit as usize);
            Ok(entries)
        }
    }

    pub type MockService = Service<MockConnection, MockConnectionManager, ReposFactoryMock>;

    pub fn create_service(user_id: Option<UserId>) -> MockService {
        create_service_with(
            user_id,
            ReposFactoryMock::default(),
            MercadoPagoClientMock::default(),
            EmailClientMock::default(),
        )
    }

    pub fn create_service_with(
        user_id: Option<UserId>,
        repo_factory: ReposFactoryMock,
        payments_client: MercadoPagoClientMock,
        email_client: EmailClientMock,
    ) -> MockService {
        let manager = MockConnectionManager::default();
        let db_pool = r2d2::Pool::builder().build(manager).expect("Failed to create connection pool");
        let cpu_pool = CpuPool::new(1);

        let config = Config::new().unwrap();
        let static_context = StaticContext::new(
            db_pool,
            cpu_pool,
            Arc::new(config),
            repo_factory,
            Arc::new(payments_client),
            Arc::new(email_client),
        );
        let dynamic_context = DynamicContext::new(user_id, String::default());

        Service::new(static_context, dynamic_context)
    }

    #[derive(Default)]
    pub struct MockConnection {
        tr: AnsiTransactionManager,
    }

    impl Connection for MockConnection {
        type Backend = Pg;
        type TransactionManager = AnsiTransactionManager;

        fn establish(_database_url: &str) -> ConnectionResult<MockConnection> {
            Ok(MockConnection::default())
        }

        fn execute(&self, _query: &str) -> QueryResult<usize> {
            unimplemented!()
        }

        fn query_by_index<T, U>(&self, _source: T) -> QueryResult<Vec<U>>
        where
            T: AsQuery,
            T::Query: QueryFragment<Pg> + QueryId,
            Pg: HasSqlType<T::SqlType>,
            U: Queryable<T::SqlType, Pg>,
        {
            unimplemented!()
        }

        fn query_by_name<T, U>(&self, _source: &T) -> QueryResult<Vec<U>>
        where
            T: QueryFragment<Pg> + QueryId,
            U: QueryableByName<Pg>,
        {
            unimplemented!()
        }

        fn execute_returning_count<T>(&self, _source: &T) -> QueryResult<usize>
        where
            T: QueryFragment<Pg> + QueryId,
        {
            unimplemented!()
        }

        fn transaction_manager(&self) -> &Self::TransactionManager {
            &self.tr
        }
    }

    impl SimpleConnection for MockConnection {
        fn batch_execute(&self, _query: &str) -> QueryResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockConnectionManager;

    impl ManageConnection for MockConnectionManager {
        type Connection = MockConnection;
        type Error = MockError;

        fn connect(&self) -> Result<MockConnection, MockError> {
            Ok(MockConnection::default())
        }

        fn is_valid(&self, _conn: &mut MockConnection) -> Result<(), MockError> {
            Ok(())
        }

        fn has_broken(&self, _conn: &mut MockConnection) -> bool {
            false
        }
    }

    #[derive(Debug)]
    pub struct MockError {}

    impl std::fmt::Display for MockError {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "Mock connection error")
        }
    }

    impl std::error::Error for MockError {}
}
