//! Repo for products table

use chrono::Utc;
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Fail;

use crate::models::authorization::*;
use crate::models::{ListingStatus, NewProduct, Pagination, Product, ProductId, ProductsSearch, UpdateProduct, UserId};
use crate::schema::products::dsl as Products;

use super::acl::{self, Acl, CheckScope};
use super::error::*;
use super::types::RepoResult;

pub type ProductsRepoAcl = Box<dyn Acl<Product>>;

pub trait ProductsRepo {
    fn get(&self, product_id: ProductId) -> RepoResult<Option<Product>>;

    fn list(&self, search: ProductsSearch, pagination: Pagination) -> RepoResult<Vec<Product>>;

    fn list_by_ids(&self, product_ids: &[ProductId]) -> RepoResult<Vec<Product>>;

    fn create(&self, payload: NewProduct) -> RepoResult<Product>;

    fn update(&self, product_id: ProductId, payload: UpdateProduct) -> RepoResult<Product>;

    /// Moves product to `status`, `rejection_reason` is replaced by the given value
    fn set_status(&self, product_id: ProductId, status: ListingStatus, rejection_reason: Option<String>) -> RepoResult<Product>;

    fn delete(&self, product_id: ProductId) -> RepoResult<Product>;

    fn count_by_status(&self, status: ListingStatus) -> RepoResult<i64>;
}

pub struct ProductsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: ProductsRepoAcl,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ProductsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: ProductsRepoAcl) -> Self {
        Self { db_conn, acl }
    }

    fn get_for_write(&self, product_id: ProductId) -> RepoResult<Product> {
        let product = Products::products
            .filter(Products::id.eq(product_id))
            .get_result::<Product>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => product_id)
            })?;
        acl::check(&*self.acl, Resource::Products, Action::Write, self, Some(&product))
            .map_err(ectx!(try ErrorKind::Forbidden => product_id))?;
        Ok(product)
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ProductsRepo for ProductsRepoImpl<'a, T> {
    fn get(&self, product_id: ProductId) -> RepoResult<Option<Product>> {
        debug!("Getting a product with ID: {}", product_id);

        let product = Products::products
            .filter(Products::id.eq(product_id))
            .get_result::<Product>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => product_id)
            })?;

        if let Some(ref product) = product {
            acl::check(&*self.acl, Resource::Products, Action::Read, self, Some(product))
                .map_err(ectx!(try ErrorKind::Forbidden => product_id))?;
        }

        Ok(product)
    }

    fn list(&self, search: ProductsSearch, pagination: Pagination) -> RepoResult<Vec<Product>> {
        debug!("Listing products by {:?}, {:?}", search, pagination);

        let mut query = Products::products.into_boxed();
        if let Some(producer_id) = search.producer_id {
            query = query.filter(Products::producer_id.eq(producer_id));
        }
        if let Some(status) = search.status {
            query = query.filter(Products::status.eq(status));
        }
        if let Some(kind) = search.kind {
            query = query.filter(Products::kind.eq(kind));
        }
        if let Some(ref title) = search.title {
            query = query.filter(Products::title.ilike(format!("%{}%", title)));
        }

        let products = query
            .order(Products::created_at.desc())
            .offset(pagination.skip)
            .limit(pagination.count)
            .get_results::<Product>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => search)
            })?;

        for product in &products {
            acl::check(&*self.acl, Resource::Products, Action::Read, self, Some(product)).map_err(ectx!(try ErrorKind::Forbidden))?;
        }

        Ok(products)
    }

    fn list_by_ids(&self, product_ids: &[ProductId]) -> RepoResult<Vec<Product>> {
        debug!("Listing products with IDs: {:?}", product_ids);

        let products = Products::products
            .filter(Products::id.eq_any(product_ids))
            .get_results::<Product>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => product_ids)
            })?;

        for product in &products {
            acl::check(&*self.acl, Resource::Products, Action::Read, self, Some(product)).map_err(ectx!(try ErrorKind::Forbidden))?;
        }

        Ok(products)
    }

    fn create(&self, payload: NewProduct) -> RepoResult<Product> {
        debug!("Creating a product with ID: {}", payload.id);

        self.db_conn.transaction::<Product, Error, _>(|| {
            let product = diesel::insert_into(Products::products)
                .values(&payload)
                .get_result::<Product>(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => payload)
                })?;
            let producer_id = product.producer_id;
            acl::check(&*self.acl, Resource::Products, Action::Write, self, Some(&product))
                .map_err(ectx!(try ErrorKind::Forbidden => producer_id))?;
            Ok(product)
        })
    }

    fn update(&self, product_id: ProductId, payload: UpdateProduct) -> RepoResult<Product> {
        debug!("Updating a product with ID: {}", product_id);
        let product = self.get_for_write(product_id)?;
        if payload.is_empty() {
            return Ok(product);
        }

        diesel::update(Products::products.filter(Products::id.eq(product_id)))
            .set((&payload, Products::updated_at.eq(Utc::now().naive_utc())))
            .get_result::<Product>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => product_id, payload)
            })
    }

    fn set_status(&self, product_id: ProductId, status: ListingStatus, rejection_reason: Option<String>) -> RepoResult<Product> {
        debug!("Setting status {} for product with ID: {}", status, product_id);
        self.get_for_write(product_id)?;

        diesel::update(Products::products.filter(Products::id.eq(product_id)))
            .set((
                Products::status.eq(status),
                Products::rejection_reason.eq(rejection_reason.clone()),
                Products::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result::<Product>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => product_id, status, rejection_reason)
            })
    }

    fn delete(&self, product_id: ProductId) -> RepoResult<Product> {
        debug!("Deleting a product with ID: {}", product_id);
        self.get_for_write(product_id)?;

        diesel::delete(Products::products.filter(Products::id.eq(product_id)))
            .get_result::<Product>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => product_id)
            })
    }

    fn count_by_status(&self, status: ListingStatus) -> RepoResult<i64> {
        debug!("Counting products with status {}", status);

        Products::products
            .filter(Products::status.eq(status))
            .count()
            .get_result(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => status)
            })
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<Product>
    for ProductsRepoImpl<'a, T>
{
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&Product>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => obj.map(|product| product.producer_id == user_id).unwrap_or(false),
        }
    }
}
