//! App store listings, moderated the same way as products

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
use crate::controller::requests::{CreateAppRequest, RejectRequest, UpdateAppRequest};
use crate::models::*;
use crate::repos::{AppsRepo, ReposFactory};

pub trait AppsService {
    fn list_published(&self, search: AppsSearch, pagination: Pagination) -> ServiceFuture<Vec<App>>;
    fn get(&self, app_id: AppId) -> ServiceFuture<App>;
    fn create(&self, payload: CreateAppRequest) -> ServiceFuture<App>;
    fn update(&self, app_id: AppId, payload: UpdateAppRequest) -> ServiceFuture<App>;
    fn delete(&self, app_id: AppId) -> ServiceFuture<App>;
    fn submit(&self, app_id: AppId) -> ServiceFuture<App>;
    fn list_pending(&self, pagination: Pagination) -> ServiceFuture<Vec<App>>;
    fn approve(&self, app_id: AppId) -> ServiceFuture<App>;
    fn reject(&self, app_id: AppId, payload: RejectRequest) -> ServiceFuture<App>;
    fn unpublish(&self, app_id: AppId) -> ServiceFuture<App>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > AppsService for Service<T, M, F>
{
    fn list_published(&self, search: AppsSearch, pagination: Pagination) -> ServiceFuture<Vec<App>> {
        debug!("Listing published apps with {:?}, {:?}", search, pagination);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let apps_repo = repo_factory.create_apps_repo(&*conn, user_id);
            let search = AppsSearch {
                status: Some(ListingStatus::Published),
                ..search
            };
            apps_repo.list(search, pagination).map_err(ectx!(convert))
        })
    }

    fn get(&self, app_id: AppId) -> ServiceFuture<App> {
        debug!("Getting app {}", app_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = optional_user(&repo_factory, &*conn, user_id)?;
            let apps_repo = repo_factory.create_apps_repo(&*conn, user_id);
            let app = find_app(&*apps_repo, app_id)?;
            let visible = app.status == ListingStatus::Published
                || user
                    .map(|user| user.role == Role::Admin || user.id == app.producer_id)
                    .unwrap_or(false);
            if visible {
                Ok(app)
            } else {
                Err(not_found(app_id))
            }
        })
    }

    fn create(&self, payload: CreateAppRequest) -> ServiceFuture<App> {
        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&user, &[Role::Producer])?;

            let CreateAppRequest {
                name,
                description,
                platform,
                download_url,
                price,
            } = payload;
            let new_app = NewApp {
                id: AppId::generate(),
                producer_id: user.id,
                name,
                description,
                platform,
                download_url,
                price,
                status: ListingStatus::Draft,
            };
            let apps_repo = repo_factory.create_apps_repo(&*conn, user_id);
            let app = apps_repo.create(new_app).map_err(ectx!(try convert))?;
            info!("App {} created by producer {}", app.id, user.id);
            Ok(app)
        })
    }

    fn update(&self, app_id: AppId, payload: UpdateAppRequest) -> ServiceFuture<App> {
        debug!("Updating app {} with {:?}", app_id, payload);

        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }
        let update = UpdateApp::from(payload);
        if update.is_empty() {
            let e = format_err!("Empty app update");
            return Box::new(future::err(ectx!(try err e, validation_error("app", "empty", "Nothing to update".to_string()))));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            current_user(&repo_factory, &*conn, user_id)?;
            let apps_repo = repo_factory.create_apps_repo(&*conn, user_id);
            let app = find_app(&*apps_repo, app_id)?;
            check_editable(&app)?;
            apps_repo.update(app.id, update).map_err(ectx!(convert => app_id))
        })
    }

    fn delete(&self, app_id: AppId) -> ServiceFuture<App> {
        debug!("Deleting app {}", app_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            current_user(&repo_factory, &*conn, user_id)?;
            let apps_repo = repo_factory.create_apps_repo(&*conn, user_id);
            let app = find_app(&*apps_repo, app_id)?;
            check_editable(&app)?;
            apps_repo.delete(app.id).map_err(ectx!(convert => app_id))
        })
    }

    fn submit(&self, app_id: AppId) -> ServiceFuture<App> {
        debug!("Submitting app {} for approval", app_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            let apps_repo = repo_factory.create_apps_repo(&*conn, user_id);
            let app = find_app(&*apps_repo, app_id)?;
            check_listing_transition(app.status, ListingStatus::PendingApproval, &user, app.producer_id)?;
            apps_repo
                .set_status(app_id, ListingStatus::PendingApproval, None)
                .map_err(ectx!(convert => app_id))
        })
    }

    fn list_pending(&self, pagination: Pagination) -> ServiceFuture<Vec<App>> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;
            let apps_repo = repo_factory.create_apps_repo(&*conn, user_id);
            let search = AppsSearch {
                status: Some(ListingStatus::PendingApproval),
                ..Default::default()
            };
            apps_repo.list(search, pagination).map_err(ectx!(convert))
        })
    }

    fn approve(&self, app_id: AppId) -> ServiceFuture<App> {
        self.moderate_app(app_id, ListingStatus::PendingApproval, ListingStatus::Published, None)
    }

    fn reject(&self, app_id: AppId, payload: RejectRequest) -> ServiceFuture<App> {
        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }
        self.moderate_app(app_id, ListingStatus::PendingApproval, ListingStatus::Draft, Some(payload.reason))
    }

    fn unpublish(&self, app_id: AppId) -> ServiceFuture<App> {
        self.moderate_app(app_id, ListingStatus::Published, ListingStatus::Draft, None)
    }
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Service<T, M, F>
{
    fn moderate_app(&self, app_id: AppId, from: ListingStatus, next: ListingStatus, reason: Option<String>) -> ServiceFuture<App> {
        debug!("Moving app {} from {} to {}", app_id, from, next);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        let fut = self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;

            let apps_repo = repo_factory.create_apps_repo(&*conn, user_id);
            let app = find_app(&*apps_repo, app_id)?;
            check_listing_source(app.status, from)?;
            check_listing_transition(app.status, next, &admin, app.producer_id)?;
            let app = apps_repo
                .set_status(app_id, next, reason.clone())
                .map_err(ectx!(try convert => app_id, next))?;
            info!("Admin {} moved app {} to {}", admin.id, app.id, next);

            if next == ListingStatus::Published {
                let event = GamificationEvent::Publish {
                    producer_id: app.producer_id,
                };
                apply_events_logged(&repo_factory, &*conn, &[event]);
            }

            let users_repo = repo_factory.create_users_repo_with_sys_acl(&*conn);
            let producer = {
                let app = &app;
                users_repo.get(app.producer_id).map_err(ectx!(try convert => app.producer_id))?
            };
            let email = producer.map(|producer| moderation_email(&producer, &app.name, next, reason.as_ref().map(String::as_str)));
            Ok((app, email))
        });

        Box::new(
            self.notify_after(fut, |(_, email): &(App, Option<Email>)| email.clone())
                .map(|(app, _)| app),
        )
    }
}

fn not_found(app_id: AppId) -> Error {
    let e = format_err!("App {} not found", app_id);
    ectx!(err e, ErrorKind::NotFound => app_id)
}

fn find_app(apps_repo: &dyn AppsRepo, app_id: AppId) -> Result<App, Error> {
    apps_repo
        .get(app_id)
        .map_err(ectx!(try convert => app_id))?
        .ok_or_else(|| not_found(app_id))
}

fn check_editable(app: &App) -> Result<(), Error> {
    if app.status.is_editable() {
        Ok(())
    } else {
        let e = format_err!("App {} is {}", app.id, app.status);
        Err(ectx!(err e, ErrorContext::ProductState, ErrorKind::InvalidTransition => app.id))
    }
}
