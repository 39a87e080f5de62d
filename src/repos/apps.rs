//! Repo for apps table

use chrono::Utc;
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Fail;

use crate::models::authorization::*;
use crate::models::{App, AppId, AppsSearch, ListingStatus, NewApp, Pagination, UpdateApp, UserId};
use crate::schema::apps::dsl as Apps;

use super::acl::{self, Acl, CheckScope};
use super::error::*;
use super::types::RepoResult;

pub type AppsRepoAcl = Box<dyn Acl<App>>;

pub trait AppsRepo {
    fn get(&self, app_id: AppId) -> RepoResult<Option<App>>;

    fn list(&self, search: AppsSearch, pagination: Pagination) -> RepoResult<Vec<App>>;

    fn create(&self, payload: NewApp) -> RepoResult<App>;

    fn update(&self, app_id: AppId, payload: UpdateApp) -> RepoResult<App>;

    fn set_status(&self, app_id: AppId, status: ListingStatus, rejection_reason: Option<String>) -> RepoResult<App>;

    fn delete(&self, app_id: AppId) -> RepoResult<App>;
}

pub struct AppsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: AppsRepoAcl,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> AppsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: AppsRepoAcl) -> Self {
        Self { db_conn, acl }
    }

    fn get_for_write(&self, app_id: AppId) -> RepoResult<App> {
        let app = Apps::apps
            .filter(Apps::id.eq(app_id))
            .get_result::<App>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => app_id)
            })?;
        acl::check(&*self.acl, Resource::Apps, Action::Write, self, Some(&app)).map_err(ectx!(try ErrorKind::Forbidden => app_id))?;
        Ok(app)
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> AppsRepo for AppsRepoImpl<'a, T> {
    fn get(&self, app_id: AppId) -> RepoResult<Option<App>> {
        debug!("Getting an app with ID: {}", app_id);

        let app = Apps::apps
            .filter(Apps::id.eq(app_id))
            .get_result::<App>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => app_id)
            })?;

        if let Some(ref app) = app {
            acl::check(&*self.acl, Resource::Apps, Action::Read, self, Some(app)).map_err(ectx!(try ErrorKind::Forbidden => app_id))?;
        }

        Ok(app)
    }

    fn list(&self, search: AppsSearch, pagination: Pagination) -> RepoResult<Vec<App>> {
        debug!("Listing apps by {:?}, {:?}", search, pagination);

        let mut query = Apps::apps.into_boxed();
        if let Some(producer_id) = search.producer_id {
            query = query.filter(Apps::producer_id.eq(producer_id));
        }
        if let Some(status) = search.status {
            query = query.filter(Apps::status.eq(status));
        }
        if let Some(platform) = search.platform {
            query = query.filter(Apps::platform.eq(platform));
        }

        let apps = query
            .order(Apps::created_at.desc())
            .offset(pagination.skip)
            .limit(pagination.count)
            .get_results::<App>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => search)
            })?;

        for app in &apps {
            acl::check(&*self.acl, Resource::Apps, Action::Read, self, Some(app)).map_err(ectx!(try ErrorKind::Forbidden))?;
        }

        Ok(apps)
    }

    fn create(&self, payload: NewApp) -> RepoResult<App> {
        debug!("Creating an app with ID: {}", payload.id);

        self.db_conn.transaction::<App, Error, _>(|| {
            let app = diesel::insert_into(Apps::apps)
                .values(&payload)
                .get_result::<App>(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => payload)
                })?;
            let producer_id = app.producer_id;
            acl::check(&*self.acl, Resource::Apps, Action::Write, self, Some(&app)).map_err(ectx!(try ErrorKind::Forbidden => producer_id))?;
            Ok(app)
        })
    }

    fn update(&self, app_id: AppId, payload: UpdateApp) -> RepoResult<App> {
        debug!("Updating an app with ID: {}", app_id);
        let app = self.get_for_write(app_id)?;
        if payload.is_empty() {
            return Ok(app);
        }

        diesel::update(Apps::apps.filter(Apps::id.eq(app_id)))
            .set((&payload, Apps::updated_at.eq(Utc::now().naive_utc())))
            .get_result::<App>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => app_id, payload)
            })
    }

    fn set_status(&self, app_id: AppId, status: ListingStatus, rejection_reason: Option<String>) -> RepoResult<App> {
        debug!("Setting status {} for app with ID: {}", status, app_id);
        self.get_for_write(app_id)?;

        diesel::update(Apps::apps.filter(Apps::id.eq(app_id)))
            .set((
                Apps::status.eq(status),
                Apps::rejection_reason.eq(rejection_reason.clone()),
                Apps::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result::<App>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => app_id, status, rejection_reason)
            })
    }

    fn delete(&self, app_id: AppId) -> RepoResult<App> {
        debug!("Deleting an app with ID: {}", app_id);
        self.get_for_write(app_id)?;

        diesel::delete(Apps::apps.filter(Apps::id.eq(app_id)))
            .get_result::<App>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => app_id)
            })
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<App> for AppsRepoImpl<'a, T> {
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&App>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => obj.map(|app| app.producer_id == user_id).unwrap_or(false),
        }
    }
}
