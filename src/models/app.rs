use chrono::NaiveDateTime;
use diesel::sql_types::VarChar;

use crate::models::{Amount, ListingStatus, UserId};
use crate::schema::apps;

uuid_id!(AppId, app_id_sql);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression)]
#[sql_type = "VarChar"]
#[serde(rename_all = "lowercase")]
pub enum AppPlatform {
    Android,
    Ios,
    Web,
    Desktop,
}

derive_varchar_enum!(AppPlatform, ParseAppPlatformError, {
    Android => "android",
    Ios => "ios",
    Web => "web",
    Desktop => "desktop",
});

#[derive(Clone, Debug, Serialize, Queryable)]
pub struct App {
    pub id: AppId,
    pub producer_id: UserId,
    pub name: String,
    pub description: String,
    pub platform: AppPlatform,
    pub download_url: String,
    pub price: Amount,
    pub status: ListingStatus,
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "apps"]
pub struct NewApp {
    pub id: AppId,
    pub producer_id: UserId,
    pub name: String,
    pub description: String,
    pub platform: AppPlatform,
    pub download_url: String,
    pub price: Amount,
    pub status: ListingStatus,
}

#[derive(Clone, Debug, Default, Deserialize, AsChangeset)]
#[table_name = "apps"]
pub struct UpdateApp {
    pub name: Option<String>,
    pub description: Option<String>,
    pub platform: Option<AppPlatform>,
    pub download_url: Option<String>,
    pub price: Option<Amount>,
}

impl UpdateApp {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.platform.is_none() && self.download_url.is_none() && self.price.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct AppsSearch {
    pub producer_id: Option<UserId>,
    pub status: Option<ListingStatus>,
    pub platform: Option<AppPlatform>,
}
