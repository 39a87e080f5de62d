//! Repo for combos and combo_products tables

use chrono::Utc;
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Fail;

use crate::models::authorization::*;
use crate::models::{Combo, ComboId, ComboProduct, CombosSearch, NewCombo, Pagination, ProductId, UpdateCombo, UserId};
use crate::schema::combo_products::dsl as ComboProducts;
use crate::schema::combos::dsl as Combos;

use super::acl::{self, Acl, CheckScope};
use super::error::*;
use super::types::RepoResult;

pub type CombosRepoAcl = Box<dyn Acl<Combo>>;

pub trait CombosRepo {
    fn get(&self, combo_id: ComboId) -> RepoResult<Option<Combo>>;

    fn list(&self, search: CombosSearch, pagination: Pagination) -> RepoResult<Vec<Combo>>;

    fn product_ids(&self, combo_id: ComboId) -> RepoResult<Vec<ProductId>>;

    fn create(&self, payload: NewCombo, product_ids: Vec<ProductId>) -> RepoResult<Combo>;

    fn update(&self, combo_id: ComboId, payload: UpdateCombo) -> RepoResult<Combo>;

    fn delete(&self, combo_id: ComboId) -> RepoResult<Combo>;
}

pub struct CombosRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: CombosRepoAcl,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CombosRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: CombosRepoAcl) -> Self {
        Self { db_conn, acl }
    }

    fn get_for_write(&self, combo_id: ComboId) -> RepoResult<Combo> {
        let combo = Combos::combos
            .filter(Combos::id.eq(combo_id))
            .get_result::<Combo>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => combo_id)
            })?;
        acl::check(&*self.acl, Resource::Combos, Action::Write, self, Some(&combo)).map_err(ectx!(try ErrorKind::Forbidden => combo_id))?;
        Ok(combo)
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CombosRepo for CombosRepoImpl<'a, T> {
    fn get(&self, combo_id: ComboId) -> RepoResult<Option<Combo>> {
        debug!("Getting a combo with ID: {}", combo_id);

        let combo = Combos::combos
            .filter(Combos::id.eq(combo_id))
            .get_result::<Combo>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => combo_id)
            })?;

        if let Some(ref combo) = combo {
            acl::check(&*self.acl, Resource::Combos, Action::Read, self, Some(combo)).map_err(ectx!(try ErrorKind::Forbidden => combo_id))?;
        }

        Ok(combo)
    }

    fn list(&self, search: CombosSearch, pagination: Pagination) -> RepoResult<Vec<Combo>> {
        debug!("Listing combos by {:?}, {:?}", search, pagination);

        let mut query = Combos::combos.into_boxed();
        if let Some(producer_id) = search.producer_id {
            query = query.filter(Combos::producer_id.eq(producer_id));
        }
        if let Some(active) = search.active {
            query = query.filter(Combos::active.eq(active));
        }

        let combos = query
            .order(Combos::created_at.desc())
            .offset(pagination.skip)
            .limit(pagination.count)
            .get_results::<Combo>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => search)
            })?;

        for combo in &combos {
            acl::check(&*self.acl, Resource::Combos, Action::Read, self, Some(combo)).map_err(ectx!(try ErrorKind::Forbidden))?;
        }

        Ok(combos)
    }

    fn product_ids(&self, combo_id: ComboId) -> RepoResult<Vec<ProductId>> {
        debug!("Listing products of combo with ID: {}", combo_id);

        ComboProducts::combo_products
            .filter(ComboProducts::combo_id.eq(combo_id))
            .select(ComboProducts::product_id)
            .get_results::<ProductId>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => combo_id)
            })
    }

    fn create(&self, payload: NewCombo, product_ids: Vec<ProductId>) -> RepoResult<Combo> {
        debug!("Creating a combo with ID: {} and products {:?}", payload.id, product_ids);

        self.db_conn.transaction::<Combo, Error, _>(|| {
            let combo = diesel::insert_into(Combos::combos)
                .values(&payload)
                .get_result::<Combo>(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => payload)
                })?;
            let combo_id = combo.id;
            acl::check(&*self.acl, Resource::Combos, Action::Write, self, Some(&combo)).map_err(ectx!(try ErrorKind::Forbidden => combo_id))?;

            let links = product_ids
                .iter()
                .map(|product_id| ComboProduct {
                    combo_id,
                    product_id: *product_id,
                })
                .collect::<Vec<_>>();
            diesel::insert_into(ComboProducts::combo_products)
                .values(&links)
                .execute(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => combo_id, product_ids)
                })?;

            Ok(combo)
        })
    }

    fn update(&self, combo_id: ComboId, payload: UpdateCombo) -> RepoResult<Combo> {
        debug!("Updating a combo with ID: {}", combo_id);
        let combo = self.get_for_write(combo_id)?;
        if payload.is_empty() {
            return Ok(combo);
        }

        diesel::update(Combos::combos.filter(Combos::id.eq(combo_id)))
            .set((&payload, Combos::updated_at.eq(Utc::now().naive_utc())))
            .get_result::<Combo>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => combo_id, payload)
            })
    }

    fn delete(&self, combo_id: ComboId) -> RepoResult<Combo> {
        debug!("Deleting a combo with ID: {}", combo_id);
        self.get_for_write(combo_id)?;

        self.db_conn.transaction::<Combo, Error, _>(|| {
            diesel::delete(ComboProducts::combo_products.filter(ComboProducts::combo_id.eq(combo_id)))
                .execute(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => combo_id)
                })?;

            diesel::delete(Combos::combos.filter(Combos::id.eq(combo_id)))
                .get_result::<Combo>(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(err e, ErrorSource::Diesel, error_kind => combo_id)
                })
        })
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<Combo> for CombosRepoImpl<'a, T> {
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&Combo>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => obj.map(|combo| combo.producer_id == user_id).unwrap_or(false),
        }
    }
}
