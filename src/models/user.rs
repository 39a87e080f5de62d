use chrono::NaiveDateTime;
use diesel::sql_types::VarChar;

use crate::models::Role;
use crate::schema::users;

uuid_id!(UserId, user_id_sql);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression)]
#[sql_type = "VarChar"]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

derive_varchar_enum!(UserStatus, ParseUserStatusError, {
    Active => "active",
    Suspended => "suspended",
});

#[derive(Clone, Debug, Queryable)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub status: UserStatus,
    pub pix_key: Option<String>,
    pub bank_name: Option<String>,
    pub bank_agency: Option<String>,
    pub bank_account: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Producers need either a PIX key or full bank details to receive payouts
    pub fn has_payout_info(&self) -> bool {
        self.pix_key.is_some() || (self.bank_name.is_some() && self.bank_agency.is_some() && self.bank_account.is_some())
    }
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "users"]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub status: UserStatus,
}

#[derive(Clone, Debug, Default, Deserialize, AsChangeset)]
#[table_name = "users"]
pub struct UpdateUser {
    pub name: Option<String>,
    pub pix_key: Option<String>,
    pub bank_name: Option<String>,
    pub bank_agency: Option<String>,
    pub bank_account: Option<String>,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.pix_key.is_none() && self.bank_name.is_none() && self.bank_agency.is_none() && self.bank_account.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct UsersSearch {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub email: Option<String>,
}
