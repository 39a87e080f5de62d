//! Registration, login and session tokens

use chrono::Utc;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Fail;
use futures::future;
use jsonwebtoken::{decode, encode, Header, Validation};
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use super::{current_user, validate, validation_error, Error, ErrorContext, ErrorKind, ErrorSource, Service};
use crate::controller::requests::RegisterRequest;
use crate::models::*;
use crate::repos::ReposFactory;

pub trait AuthService {
    /// Creates a buyer or producer account and opens a session for it
    fn register(&self, payload: RegisterRequest) -> ServiceFuture<Session>;
    /// Opens a session for valid credentials of an active user
    fn login(&self, credentials: Credentials) -> ServiceFuture<Session>;
    /// Profile of the current user
    fn me(&self) -> ServiceFuture<UserProfile>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > AuthService for Service<T, M, F>
{
    fn register(&self, payload: RegisterRequest) -> ServiceFuture<Session> {
        debug!("Registering user with email {}", payload.email);

        if let Err(e) = validate(&payload) {
            return Box::new(future::err(e));
        }

        let repo_factory = self.static_context.repo_factory.clone();
        let auth = self.static_context.config.auth.clone();

        self.spawn_on_pool(move |conn| {
            let RegisterRequest { email, password, name, role } = payload;
            let role = role.unwrap_or(Role::Buyer);
            if role == Role::Admin {
                let e = format_err!("Admin accounts cannot be registered");
                return Err(ectx!(err e, validation_error("role", "not_allowed", "Only buyer and producer accounts can be registered".to_string())));
            }

            let email = email.trim().to_lowercase();
            let users_repo = repo_factory.create_users_repo_with_sys_acl(&*conn);
            let email_cloned = email.clone();
            let existing = users_repo.get_by_email(&email).map_err(ectx!(try convert => email_cloned))?;
            if existing.is_some() {
                let e = format_err!("User with email {} already exists", email);
                return Err(ectx!(err e, validation_error("email", "exists", "Email is already registered".to_string())));
            }

            let new_user = NewUser {
                id: UserId::generate(),
                email,
                password_hash: hash_password(&password, auth.password_iterations),
                name,
                role,
                status: UserStatus::Active,
            };
            let user = users_repo.create(new_user).map_err(ectx!(try convert))?;
            info!("User {} registered as {}", user.id, user.role);
            create_session(&auth.jwt_secret, auth.token_ttl_sec, user)
        })
    }

    fn login(&self, credentials: Credentials) -> ServiceFuture<Session> {
        debug!("Logging in user with email {}", credentials.email);

        let repo_factory = self.static_context.repo_factory.clone();
        let auth = self.static_context.config.auth.clone();

        self.spawn_on_pool(move |conn| {
            let Credentials { email, password } = credentials;
            let email = email.trim().to_lowercase();
            let users_repo = repo_factory.create_users_repo_with_sys_acl(&*conn);
            let email_cloned = email.clone();
            let user = users_repo
                .get_by_email(&email)
                .map_err(ectx!(try convert => email_cloned))?
                .filter(|user| verify_password(&password, &user.password_hash))
                .ok_or_else(|| ectx!(try err ErrorContext::Credentials, ErrorKind::Unauthorized => email))?;

            if !user.is_active() {
                return Err(ectx!(err ErrorContext::Suspended, ErrorKind::Forbidden => user.id));
            }

            create_session(&auth.jwt_secret, auth.token_ttl_sec, user)
        })
    }

    fn me(&self) -> ServiceFuture<UserProfile> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;
        debug!("Getting profile of user {:?}", user_id);

        self.spawn_on_pool(move |conn| current_user(&repo_factory, &*conn, user_id).map(UserProfile::from))
    }
}

fn create_session(secret: &str, ttl_sec: i64, user: User) -> Result<Session, Error> {
    let expires_at = Utc::now().timestamp() + ttl_sec;
    let token = create_token(secret, user.id, expires_at)?;
    Ok(Session {
        token,
        expires_at,
        user: user.into(),
    })
}

/// HS256 token for `user_id` valid until the unix time `exp`
pub fn create_token(secret: &str, user_id: UserId, exp: i64) -> Result<String, Error> {
    let claims = JwtClaims { user_id, exp };
    encode(&Header::default(), &claims, secret.as_bytes()).map_err(ectx!(ErrorSource::Jwt, ErrorKind::Internal => user_id))
}

/// User of a valid, unexpired token
pub fn decode_token(secret: &str, token: &str) -> Result<UserId, Error> {
    decode::<JwtClaims>(token, secret.as_bytes(), &Validation::default())
        .map(|data| data.claims.user_id)
        .map_err(ectx!(ErrorSource::Jwt, ErrorContext::Token, ErrorKind::Unauthorized))
}

#[cfg(test)]
mod tests {
    use tokio_core::reactor::Core;

    use super::*;
    use crate::repos::repo_factory::tests::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip() {
        let user_id = UserId::generate();
        let token = create_token(SECRET, user_id, Utc::now().timestamp() + 60).unwrap();
        assert_eq!(decode_token(SECRET, &token).unwrap(), user_id);
    }

    #[test]
    fn test_expired_or_foreign_token_is_rejected() {
        let user_id = UserId::generate();
        let expired = create_token(SECRET, user_id, Utc::now().timestamp() - 3_600).unwrap();
        assert_eq!(decode_token(SECRET, &expired).unwrap_err().kind(), ErrorKind::Unauthorized);

        let token = create_token(SECRET, user_id, Utc::now().timestamp() + 60).unwrap();
        assert_eq!(decode_token("other-secret", &token).unwrap_err().kind(), ErrorKind::Unauthorized);
        assert_eq!(decode_token(SECRET, "garbage").unwrap_err().kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_register_buyer() {
        let mut core = Core::new().unwrap();
        let service = create_service(None);
        let payload = RegisterRequest {
            email: "New.Buyer@eduplay.test".to_string(),
            password: "long enough".to_string(),
            name: "New buyer".to_string(),
            role: None,
        };
        let session = core.run(service.register(payload)).unwrap();
        assert_eq!(session.user.email, "new.buyer@eduplay.test");
        assert_eq!(session.user.role, Role::Buyer);
        let secret = service.static_context.config.auth.jwt_secret.clone();
        assert_eq!(decode_token(&secret, &session.token).unwrap(), session.user.id);
    }

    #[test]
    fn test_register_rejects_admin_and_taken_email() {
        let mut core = Core::new().unwrap();
        let service = create_service(None);
        let admin = RegisterRequest {
            email: "root@eduplay.test".to_string(),
            password: "long enough".to_string(),
            name: "Root".to_string(),
            role: Some(Role::Admin),
        };
        match core.run(service.register(admin)).unwrap_err().kind() {
            ErrorKind::Validation(_) => (),
            other => panic!("unexpected kind {:?}", other),
        }

        let taken = RegisterRequest {
            email: "buyer@eduplay.test".to_string(),
            password: "long enough".to_string(),
            name: "Buyer".to_string(),
            role: Some(Role::Producer),
        };
        match core.run(service.register(taken)).unwrap_err().kind() {
            ErrorKind::Validation(payload) => assert!(payload.to_string().contains("exists")),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_login() {
        let mut core = Core::new().unwrap();
        let service = create_service(None);
        let ok = Credentials {
            email: "buyer@eduplay.test".to_string(),
            password: PASSWORD.to_string(),
        };
        let session = core.run(service.login(ok)).unwrap();
        assert_eq!(session.user.id, buyer_id());

        let wrong_password = Credentials {
            email: "buyer@eduplay.test".to_string(),
            password: "wrong".to_string(),
        };
        assert_eq!(core.run(service.login(wrong_password)).unwrap_err().kind(), ErrorKind::Unauthorized);

        let unknown = Credentials {
            email: "nobody@eduplay.test".to_string(),
            password: PASSWORD.to_string(),
        };
        assert_eq!(core.run(service.login(unknown)).unwrap_err().kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_suspended_user_cannot_log_in_or_use_token() {
        let mut core = Core::new().unwrap();
        let credentials = Credentials {
            email: "suspended@eduplay.test".to_string(),
            password: PASSWORD.to_string(),
        };
        let service = create_service(None);
        assert_eq!(core.run(service.login(credentials)).unwrap_err().kind(), ErrorKind::Forbidden);

        let service = create_service(Some(suspended_id()));
        assert_eq!(core.run(service.me()).unwrap_err().kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_me() {
        let mut core = Core::new().unwrap();
        let service = create_service(Some(producer_id()));
        let profile = core.run(service.me()).unwrap();
        assert_eq!(profile.id, producer_id());
        assert_eq!(profile.role, Role::Producer);

        let anonymous = create_service(None);
        assert_eq!(core.run(anonymous.me()).unwrap_err().kind(), ErrorKind::Unauthorized);
    }
}
