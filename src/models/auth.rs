use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Role, User, UserId};

/// Payload of the session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtClaims {
    pub user_id: UserId,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Token issued on login or registration
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub expires_at: i64,
    pub user: UserProfile,
}

/// User as exposed over the API, without the password hash
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub status: crate::models::UserStatus,
    pub pix_key: Option<String>,
    pub bank_name: Option<String>,
    pub bank_agency: Option<String>,
    pub bank_account: Option<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        let User {
            id,
            email,
            name,
            role,
            status,
            pix_key,
            bank_name,
            bank_agency,
            bank_account,
            ..
        } = user;
        UserProfile {
            id,
            email,
            name,
            role,
            status,
            pix_key,
            bank_name,
            bank_agency,
            bank_account,
        }
    }
}

/// Salted and iterated SHA-256, stored as `iterations$salt$hash`
pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let hash = digest(password, &salt, iterations);
    format!("{}${}${}", iterations, salt, hash)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (iterations, salt, hash) = match (parts.next(), parts.next(), parts.next()) {
        (Some(iterations), Some(salt), Some(hash)) => (iterations, salt, hash),
        _ => return false,
    };
    let iterations = match iterations.parse::<u32>() {
        Ok(iterations) if iterations > 0 => iterations,
        _ => return false,
    };
    constant_time_eq(digest(password, salt, iterations).as_bytes(), hash.as_bytes())
}

fn digest(password: &str, salt: &str, iterations: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.input(salt.as_bytes());
    hasher.input(password.as_bytes());
    let mut result = hasher.result();
    for _ in 1..iterations {
        let mut hasher = Sha256::new();
        hasher.input(&result);
        hasher.input(salt.as_bytes());
        result = hasher.result();
    }
    hex::encode(result)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
