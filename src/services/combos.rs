//! Discounted bundles of a producer's products

use std::collections::HashSet;

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use futures::future;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use super::{current_user, optional_user, require_role, validate, validation_error, Error, ErrorContext, ErrorKind, Service};
use crate::controller::requests::{CreateComboRequest, UpdateComboRequest};
use crate::models::*;
use crate::repos::{CombosRepo, ProductsRepo, ReposFactory};

pub trait CombosService {
    /// Active combos
    fn list(&self, search: CombosSearch, pagination: Pagination) -> ServiceFuture<Vec<Combo>>;
    fn get(&self, combo_id: ComboId) -> ServiceFuture<ComboWithProducts>;
    fn create(&self, payload: CreateComboRequest) -> ServiceFuture<ComboWithProducts>;
    fn update(&self, combo_id: ComboId, payload: UpdateComboRequest) -> ServiceFuture<Combo>;
    fn delete(&self, combo_id: ComboId) -> ServiceFuture<Combo>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > CombosService for Service<T, M, F>
{
    fn list(&self, search: CombosSearch, pagination: Pagination) -> ServiceFuture<Vec<Combo>> {
        debug!("Listing combos with {:?}, {:?}", search, pagination);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let combos_repo = repo_factory.create_combos_repo(&*conn, user_id);
            let search = CombosSearch {
                active: Some(true),
                ..search
            };
            combos_repo.list(search, pagination).map_err(ectx!(convert))
        })
    }

    fn get(&self, combo_id: ComboId) -> ServiceFuture<ComboWithProducts> {
        debug!("Getting combo {}", combo_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = optional_user(&repo_factory, &*conn, user_id)?;
            let combos_repo = repo_factory.create_combos_repo(&*conn, user_id);
            let combo = find_combo(&*combos_repo, combo_id)?;
            let visible = combo.active || user.map(|user| can_manage(&user, &combo)).unwrap_or(false);
            if !visible {
                return Err(not_found(combo_id));
            }

            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let products = combo_products(&*combos_repo, &*products_repo, combo_id)?;
            with_products(combo, products)
        })
    }

    fn create(&self, payload: CreateComboRequest) -> ServiceFuture<ComboWithProducts> {
        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&user, &[Role::Producer])?;
            debug!("Creating combo {} for producer {}", payload.title, user.id);

            let CreateComboRequest {
                title,
                description,
                price,
                product_ids,
            } = payload;
            let mut seen = HashSet::new();
            let product_ids = product_ids.into_iter().filter(|id| seen.insert(*id)).collect::<Vec<_>>();

            let products_repo = repo_factory.create_products_repo(&*conn, user_id);
            let product_ids_cloned = product_ids.clone();
            let products = products_repo
                .list_by_ids(&product_ids)
                .map_err(ectx!(try convert => product_ids_cloned))?;
            if products.len() != product_ids.len() {
                let e = format_err!("Some products of the combo do not exist");
                return Err(ectx!(err e, ErrorContext::Combo, validation_error("product_ids", "not_found", "Unknown product".to_string()) => product_ids));
            }
            check_rules(user.id, price, &products)?;

            let new_combo = NewCombo {
                id: ComboId::generate(),
                producer_id: user.id,
                title,
                description,
                price,
                active: true,
            };
            let combos_repo = repo_factory.create_combos_repo(&*conn, user_id);
            let combo = combos_repo.create(new_combo, product_ids).map_err(ectx!(try convert))?;
            info!("Combo {} created by producer {}", combo.id, user.id);
            with_products(combo, products)
        })
    }

    fn update(&self, combo_id: ComboId, payload: UpdateComboRequest) -> ServiceFuture<Combo> {
        debug!("Updating combo {} with {:?}", combo_id, payload);

        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }
        let update = UpdateCombo::from(payload);
        if update.is_empty() {
            let e = format_err!("Empty combo update");
            return Box::new(future::err(ectx!(try err e, validation_error("combo", "empty", "Nothing to update".to_string()))));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            let combos_repo = repo_factory.create_combos_repo(&*conn, user_id);
            let combo = find_combo(&*combos_repo, combo_id)?;
            check_owner(&user, &combo)?;

            if let Some(price) = update.price {
                let products_repo = repo_factory.create_products_repo(&*conn, user_id);
                let products = combo_products(&*combos_repo, &*products_repo, combo_id)?;
                check_rules(combo.producer_id, price, &products)?;
            }
            combos_repo.update(combo_id, update).map_err(ectx!(convert => combo_id))
        })
    }

    fn delete(&self, combo_id: ComboId) -> ServiceFuture<Combo> {
        debug!("Deleting combo {}", combo_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            let combos_repo = repo_factory.create_combos_repo(&*conn, user_id);
            let combo = find_combo(&*combos_repo, combo_id)?;
            check_owner(&user, &combo)?;
            let combo = combos_repo.delete(combo_id).map_err(ectx!(try convert => combo_id))?;
            info!("Combo {} deleted", combo.id);
            Ok(combo)
        })
    }
}

fn not_found(combo_id: ComboId) -> Error {
    let e = format_err!("Combo {} not found", combo_id);
    ectx!(err e, ErrorKind::NotFound => combo_id)
}

fn find_combo(combos_repo: &dyn CombosRepo, combo_id: ComboId) -> Result<Combo, Error> {
    combos_repo
        .get(combo_id)
        .map_err(ectx!(try convert => combo_id))?
        .ok_or_else(|| not_found(combo_id))
}

fn combo_products(combos_repo: &dyn CombosRepo, products_repo: &dyn ProductsRepo, combo_id: ComboId) -> Result<Vec<Product>, Error> {
    let product_ids = combos_repo.product_ids(combo_id).map_err(ectx!(try convert => combo_id))?;
    products_repo.list_by_ids(&product_ids).map_err(ectx!(convert => combo_id))
}

fn with_products(combo: Combo, products: Vec<Product>) -> Result<ComboWithProducts, Error> {
    let original_price = Amount::checked_sum(products.iter().map(|p| p.price)).ok_or_else(|| {
        let e = format_err!("Combo price overflow");
        ectx!(try err e, ErrorContext::AmountOverflow, ErrorKind::Internal => combo.id)
    })?;
    Ok(ComboWithProducts {
        combo,
        products,
        original_price,
    })
}

fn can_manage(user: &User, combo: &Combo) -> bool {
    user.role == Role::Admin || user.id == combo.producer_id
}

fn check_owner(user: &User, combo: &Combo) -> Result<(), Error> {
    if can_manage(user, combo) {
        Ok(())
    } else {
        let e = format_err!("Combo {} belongs to another producer", combo.id);
        Err(ectx!(err e, ErrorKind::Forbidden => user.id, combo.id))
    }
}

fn check_rules(producer_id: UserId, price: Amount, products: &[Product]) -> Result<Amount, Error> {
    check_combo(producer_id, price, products).map_err(|violation| {
        let field = match violation {
            ComboRuleViolation::TooFewProducts(_) | ComboRuleViolation::ForeignProduct(_) => "product_ids",
            ComboRuleViolation::PriceNotDiscounted(_) | ComboRuleViolation::ZeroPrice | ComboRuleViolation::Overflow => "price",
        };
        let message = violation.to_string();
        ectx!(try err violation, ErrorContext::Combo, validation_error(field, "combo_rules", message) => producer_id, price)
    })
}
