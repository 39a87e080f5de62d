//! Enum for roles available in ACLs. Every user has exactly one role.

use diesel::sql_types::VarChar;
use enum_iterator::IntoEnumIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression, IntoEnumIterator)]
#[sql_type = "VarChar"]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Producer,
    Admin,
}

derive_varchar_enum!(Role, ParseRoleError, {
    Buyer => "buyer",
    Producer => "producer",
    Admin => "admin",
});
