//! Repo for users table

use std::sync::Arc;

use chrono::Utc;
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Fail;

use crate::models::authorization::*;
use crate::models::{NewUser, Pagination, UpdateUser, User, UserId, UserStatus, UsersSearch};
use crate::schema::users::dsl as Users;

use super::acl::{self, Acl, CheckScope, RolesCacheImpl};
use super::error::*;
use super::types::RepoResult;

pub type UsersRepoAcl = Box<dyn Acl<User>>;

pub trait UsersRepo {
    fn get(&self, user_id: UserId) -> RepoResult<Option<User>>;

    fn get_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    fn create(&self, payload: NewUser) -> RepoResult<User>;

    fn update(&self, user_id: UserId, payload: UpdateUser) -> RepoResult<User>;

    fn set_role(&self, user_id: UserId, role: Role) -> RepoResult<User>;

    fn set_status(&self, user_id: UserId, status: UserStatus) -> RepoResult<User>;

    fn list(&self, search: UsersSearch, pagination: Pagination) -> RepoResult<Vec<User>>;

    fn count_by_role(&self, role: Role) -> RepoResult<i64>;
}

pub struct UsersRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: UsersRepoAcl,
    pub cached_roles: Arc<RolesCacheImpl>,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> UsersRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: UsersRepoAcl, cached_roles: Arc<RolesCacheImpl>) -> Self {
        Self { db_conn, acl, cached_roles }
    }

    fn check_write(&self, user_id: UserId) -> RepoResult<User> {
        let user = Users::users
            .filter(Users::id.eq(user_id))
            .get_result::<User>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => user_id)
            })?;
        acl::check(&*self.acl, Resource::Users, Action::Write, self, Some(&user)).map_err(ectx!(try ErrorKind::Forbidden => user_id))?;
        Ok(user)
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> UsersRepo for UsersRepoImpl<'a, T> {
    fn get(&self, user_id: UserId) -> RepoResult<Option<User>> {
        debug!("Getting a user with ID: {}", user_id);

        let user = Users::users
            .filter(Users::id.eq(user_id))
            .get_result::<User>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => user_id)
            })?;

        if let Some(ref user) = user {
            acl::check(&*self.acl, Resource::Users, Action::Read, self, Some(user)).map_err(ectx!(try ErrorKind::Forbidden => user_id))?;
        }

        Ok(user)
    }

    fn get_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        debug!("Getting a user by email: {}", email);

        let user = Users::users
            .filter(Users::email.eq(email.to_lowercase()))
            .get_result::<User>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind)
            })?;

        if let Some(ref user) = user {
            acl::check(&*self.acl, Resource::Users, Action::Read, self, Some(user)).map_err(ectx!(try ErrorKind::Forbidden))?;
        }

        Ok(user)
    }

    fn create(&self, payload: NewUser) -> RepoResult<User> {
        debug!("Creating a user with ID: {}", payload.id);
        acl::check(&*self.acl, Resource::Users, Action::Write, self, None).map_err(ectx!(try ErrorKind::Forbidden))?;

        diesel::insert_into(Users::users)
            .values(&payload)
            .get_result::<User>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind)
            })
    }

    fn update(&self, user_id: UserId, payload: UpdateUser) -> RepoResult<User> {
        debug!("Updating a user with ID: {}", user_id);
        let user = self.check_write(user_id)?;
        if payload.is_empty() {
            return Ok(user);
        }

        diesel::update(Users::users.filter(Users::id.eq(user_id)))
            .set((&payload, Users::updated_at.eq(Utc::now().naive_utc())))
            .get_result::<User>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => user_id, payload)
            })
    }

    fn set_role(&self, user_id: UserId, role: Role) -> RepoResult<User> {
        debug!("Setting role {} for user with ID: {}", role, user_id);
        acl::check(&*self.acl, Resource::Users, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden => user_id))?;

        diesel::update(Users::users.filter(Users::id.eq(user_id)))
            .set((Users::role.eq(role), Users::updated_at.eq(Utc::now().naive_utc())))
            .get_result::<User>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => user_id, role)
            })
            .map(|user| {
                self.cached_roles.remove(user_id);
                user
            })
    }

    fn set_status(&self, user_id: UserId, status: UserStatus) -> RepoResult<User> {
        debug!("Setting status {} for user with ID: {}", status, user_id);
        acl::check(&*self.acl, Resource::Users, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden => user_id))?;

        diesel::update(Users::users.filter(Users::id.eq(user_id)))
            .set((Users::status.eq(status), Users::updated_at.eq(Utc::now().naive_utc())))
            .get_result::<User>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => user_id, status)
            })
            .map(|user| {
                self.cached_roles.remove(user_id);
                user
            })
    }

    fn list(&self, search: UsersSearch, pagination: Pagination) -> RepoResult<Vec<User>> {
        debug!("Listing users by {:?}, {:?}", search, pagination);

        let mut query = Users::users.into_boxed();
        if let Some(role) = search.role {
            query = query.filter(Users::role.eq(role));
        }
        if let Some(status) = search.status {
            query = query.filter(Users::status.eq(status));
        }
        if let Some(ref email) = search.email {
            query = query.filter(Users::email.like(format!("%{}%", email.to_lowercase())));
        }

        let users = query
            .order(Users::created_at.desc())
            .offset(pagination.skip)
            .limit(pagination.count)
            .get_results::<User>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => search)
            })?;

        for user in &users {
            acl::check(&*self.acl, Resource::Users, Action::Read, self, Some(user)).map_err(ectx!(try ErrorKind::Forbidden))?;
        }

        Ok(users)
    }

    fn count_by_role(&self, role: Role) -> RepoResult<i64> {
        debug!("Counting users with role {}", role);
        acl::check(&*self.acl, Resource::Users, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden))?;

        Users::users
            .filter(Users::role.eq(role))
            .count()
            .get_result(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => role)
            })
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<User> for UsersRepoImpl<'a, T> {
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&User>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => obj.map(|user| user.id == user_id).unwrap_or(false),
        }
    }
}
