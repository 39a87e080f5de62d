use chrono::NaiveDateTime;
use diesel::sql_types::VarChar;
use enum_iterator::IntoEnumIterator;

use crate::models::{Amount, Role, UserId};
use crate::schema::products;

uuid_id!(ProductId, product_id_sql);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression)]
#[sql_type = "VarChar"]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Course,
    Ebook,
    App,
    Other,
}

derive_varchar_enum!(ProductKind, ParseProductKindError, {
    Course => "course",
    Ebook => "ebook",
    App => "app",
    Other => "other",
});

/// Moderation status shared by products and apps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression, IntoEnumIterator)]
#[sql_type = "VarChar"]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Editable by the producer, not visible to buyers
    Draft,
    /// Submitted by the producer, waiting for an admin
    PendingApproval,
    /// Approved by an admin and visible in the store
    Published,
}

derive_varchar_enum!(ListingStatus, ParseListingStatusError, {
    Draft => "draft",
    PendingApproval => "pending_approval",
    Published => "published",
});

impl ListingStatus {
    /// Checks whether `actor` may move a listing from `self` to `next`.
    /// `is_owner` tells if the actor is the producer of the listing.
    pub fn can_transition_to(self, next: ListingStatus, actor: Role, is_owner: bool) -> bool {
        match (self, next) {
            (ListingStatus::Draft, ListingStatus::PendingApproval) => is_owner,
            (ListingStatus::PendingApproval, ListingStatus::Published) => actor == Role::Admin,
            (ListingStatus::PendingApproval, ListingStatus::Draft) => actor == Role::Admin,
            (ListingStatus::Published, ListingStatus::Draft) => actor == Role::Admin,
            _ => false,
        }
    }

    pub fn is_editable(self) -> bool {
        self == ListingStatus::Draft
    }
}

#[derive(Clone, Debug, Serialize, Queryable)]
pub struct Product {
    pub id: ProductId,
    pub producer_id: UserId,
    pub title: String,
    pub description: String,
    pub kind: ProductKind,
    pub price: Amount,
    pub status: ListingStatus,
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Product {
    pub fn is_published(&self) -> bool {
        self.status == ListingStatus::Published
    }
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "products"]
pub struct NewProduct {
    pub id: ProductId,
    pub producer_id: UserId,
    pub title: String,
    pub description: String,
    pub kind: ProductKind,
    pub price: Amount,
    pub status: ListingStatus,
}

#[derive(Clone, Debug, Default, Deserialize, AsChangeset)]
#[table_name = "products"]
pub struct UpdateProduct {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<ProductKind>,
    pub price: Option<Amount>,
}

impl UpdateProduct {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.kind.is_none() && self.price.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProductsSearch {
    pub producer_id: Option<UserId>,
    pub status: Option<ListingStatus>,
    pub kind: Option<ProductKind>,
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUSES: [ListingStatus; 3] = [ListingStatus::Draft, ListingStatus::PendingApproval, ListingStatus::Published];

    #[test]
    fn test_owner_can_only_submit() {
        for from in STATUSES.iter() {
            for to in STATUSES.iter() {
                let allowed = from.can_transition_to(*to, Role::Producer, true);
                let expected = *from == ListingStatus::Draft && *to == ListingStatus::PendingApproval;
                assert_eq!(allowed, expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_only_admin_publishes() {
        assert!(ListingStatus::PendingApproval.can_transition_to(ListingStatus::Published, Role::Admin, false));
        assert!(!ListingStatus::PendingApproval.can_transition_to(ListingStatus::Published, Role::Producer, true));
        assert!(!ListingStatus::PendingApproval.can_transition_to(ListingStatus::Published, Role::Buyer, false));
        assert!(!ListingStatus::Draft.can_transition_to(ListingStatus::Published, Role::Admin, false));
    }

    #[test]
    fn test_admin_moderation_transitions() {
        assert!(ListingStatus::PendingApproval.can_transition_to(ListingStatus::Draft, Role::Admin, false));
        assert!(ListingStatus::Published.can_transition_to(ListingStatus::Draft, Role::Admin, false));
        assert!(!ListingStatus::Published.can_transition_to(ListingStatus::PendingApproval, Role::Admin, false));
        assert!(!ListingStatus::Draft.can_transition_to(ListingStatus::Draft, Role::Admin, false));
    }

    #[test]
    fn test_stranger_cannot_submit() {
        assert!(!ListingStatus::Draft.can_transition_to(ListingStatus::PendingApproval, Role::Producer, false));
        assert!(!ListingStatus::Draft.can_transition_to(ListingStatus::PendingApproval, Role::Buyer, false));
        assert!(!ListingStatus::Draft.can_transition_to(ListingStatus::PendingApproval, Role::Admin, false));
    }

    #[test]
    fn test_listing_status_strings() {
        assert_eq!(ListingStatus::PendingApproval.to_string(), "pending_approval");
        assert_eq!("published".parse::<ListingStatus>().unwrap(), ListingStatus::Published);
        assert_eq!(
            serde_json::to_string(&ListingStatus::PendingApproval).unwrap(),
            "\"pending_approval\""
        );
    }
}
