//! Own profile and payout details, admin moderation of users

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use futures::future;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use super::{current_user, require_role, validate, validation_error, Error, ErrorKind, Service};
use crate::controller::requests::{UpdatePayoutRequest, UpdateProfileRequest};
use crate::models::*;
use crate::repos::ReposFactory;

pub trait UsersService {
    fn update_profile(&self, payload: UpdateProfileRequest) -> ServiceFuture<UserProfile>;
    /// PIX key or bank account receiving producer payouts
    fn update_payout(&self, payload: UpdatePayoutRequest) -> ServiceFuture<UserProfile>;
    fn list_users(&self, search: UsersSearch, pagination: Pagination) -> ServiceFuture<Vec<UserProfile>>;
    fn set_role(&self, user_id: UserId, role: Role) -> ServiceFuture<UserProfile>;
    fn set_status(&self, user_id: UserId, status: UserStatus) -> ServiceFuture<UserProfile>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > UsersService for Service<T, M, F>
{
    fn update_profile(&self, payload: UpdateProfileRequest) -> ServiceFuture<UserProfile> {
        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Updating profile of user {}", user.id);
            let update = UpdateUser {
                name: Some(payload.name),
                ..Default::default()
            };
            let users_repo = repo_factory.create_users_repo(&*conn, user_id);
            users_repo
                .update(user.id, update)
                .map(UserProfile::from)
                .map_err(ectx!(convert => user.id))
        })
    }

    fn update_payout(&self, payload: UpdatePayoutRequest) -> ServiceFuture<UserProfile> {
        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&user, &[Role::Producer, Role::Admin])?;
            debug!("Updating payout details of user {}", user.id);

            let update = UpdateUser::from(payload);
            if update.is_empty() {
                let e = format_err!("Empty payout update");
                return Err(ectx!(err e, validation_error("payout", "empty", "Nothing to update".to_string()) => user.id));
            }

            let users_repo = repo_factory.create_users_repo(&*conn, user_id);
            users_repo
                .update(user.id, update)
                .map(UserProfile::from)
                .map_err(ectx!(convert => user.id))
        })
    }

    fn list_users(&self, search: UsersSearch, pagination: Pagination) -> ServiceFuture<Vec<UserProfile>> {
        debug!("Listing users with {:?}, {:?}", search, pagination);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;
            let users_repo = repo_factory.create_users_repo(&*conn, user_id);
            users_repo
                .list(search, pagination)
                .map(|users| users.into_iter().map(UserProfile::from).collect())
                .map_err(ectx!(convert))
        })
    }

    fn set_role(&self, target_id: UserId, role: Role) -> ServiceFuture<UserProfile> {
        debug!("Setting role {} for user {}", role, target_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;
            if admin.id == target_id {
                let e = format_err!("Admin {} tried to change own role", admin.id);
                return Err(ectx!(err e, validation_error("user_id", "self", "Admins cannot change their own role".to_string())));
            }

            let users_repo = repo_factory.create_users_repo(&*conn, user_id);
            let user = users_repo.set_role(target_id, role).map_err(ectx!(try convert => target_id, role))?;
            info!("Admin {} set role {} for user {}", admin.id, role, target_id);
            Ok(user.into())
        })
    }

    fn set_status(&self, target_id: UserId, status: UserStatus) -> ServiceFuture<UserProfile> {
        debug!("Setting status {} for user {}", status, target_id);

        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let admin = current_user(&repo_factory, &*conn, user_id)?;
            require_role(&admin, &[Role::Admin])?;
            if admin.id == target_id {
                let e = format_err!("Admin {} tried to change own status", admin.id);
                return Err(ectx!(err e, validation_error("user_id", "self", "Admins cannot change their own status".to_string())));
            }

            let users_repo = repo_factory.create_users_repo(&*conn, user_id);
            let user = users_repo.set_status(target_id, status).map_err(ectx!(try convert => target_id, status))?;
            info!("Admin {} set status {} for user {}", admin.id, status, target_id);
            Ok(user.into())
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio_core::reactor::Core;

    use super::*;
    use crate::repos::repo_factory::tests::*;

    #[test]
    fn test_update_profile() {
        let mut core = Core::new().unwrap();
        let service = create_service(Some(buyer_id()));
        let profile = core
            .run(service.update_profile(UpdateProfileRequest {
                name: "Renamed".to_string(),
            }))
            .unwrap();
        assert_eq!(profile.name, "Renamed");

        let blank = service.update_profile(UpdateProfileRequest { name: String::new() });
        match core.run(blank).unwrap_err().kind() {
            ErrorKind::Validation(_) => (),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_payout_is_for_producers() {
        let mut core = Core::new().unwrap();
        let payload = UpdatePayoutRequest {
            pix_key: Some("producer@eduplay.test".to_string()),
            bank_name: None,
            bank_agency: None,
            bank_account: None,
        };

        let producer = create_service(Some(producer_id()));
        let profile = core.run(producer.update_payout(payload.clone())).unwrap();
        assert_eq!(profile.pix_key, payload.pix_key);

        let buyer = create_service(Some(buyer_id()));
        assert_eq!(core.run(buyer.update_payout(payload)).unwrap_err().kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_admin_moderates_users() {
        let mut core = Core::new().unwrap();
        let admin = create_service(Some(admin_id()));

        let user = core.run(admin.set_role(buyer_id(), Role::Producer)).unwrap();
        assert_eq!(user.role, Role::Producer);

        let user = core.run(admin.set_status(buyer_id(), UserStatus::Suspended)).unwrap();
        assert_eq!(user.status, UserStatus::Suspended);

        match core.run(admin.set_status(admin_id(), UserStatus::Suspended)).unwrap_err().kind() {
            ErrorKind::Validation(_) => (),
            other => panic!("unexpected kind {:?}", other),
        }

        let users = core.run(admin.list_users(UsersSearch::default(), Pagination::default())).unwrap();
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn test_non_admin_cannot_moderate() {
        let mut core = Core::new().unwrap();
        let producer = create_service(Some(producer_id()));
        assert_eq!(core.run(producer.set_role(buyer_id(), Role::Admin)).unwrap_err().kind(), ErrorKind::Forbidden);
        assert_eq!(
            core.run(producer.list_users(UsersSearch::default(), Pagination::default())).unwrap_err().kind(),
            ErrorKind::Forbidden
        );

        let anonymous = create_service(None);
        assert_eq!(
            core.run(anonymous.set_status(buyer_id(), UserStatus::Suspended)).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }
}
