use std::collections::HashSet;

use chrono::NaiveDateTime;

use crate::models::{Amount, Product, ProductId, UserId};
use crate::schema::{combo_products, combos};

uuid_id!(ComboId, combo_id_sql);

pub const MIN_COMBO_PRODUCTS: usize = 2;

#[derive(Clone, Debug, Serialize, Queryable)]
pub struct Combo {
    pub id: ComboId,
    pub producer_id: UserId,
    pub title: String,
    pub description: String,
    pub price: Amount,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "combos"]
pub struct NewCombo {
    pub id: ComboId,
    pub producer_id: UserId,
    pub title: String,
    pub description: String,
    pub price: Amount,
    pub active: bool,
}

#[derive(Clone, Debug, Default, Deserialize, AsChangeset)]
#[table_name = "combos"]
pub struct UpdateCombo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Amount>,
    pub active: Option<bool>,
}

impl UpdateCombo {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.price.is_none() && self.active.is_none()
    }
}

#[derive(Clone, Debug, Queryable, Insertable)]
#[table_name = "combo_products"]
pub struct ComboProduct {
    pub combo_id: ComboId,
    pub product_id: ProductId,
}

#[derive(Clone, Debug, Default)]
pub struct CombosSearch {
    pub producer_id: Option<UserId>,
    pub active: Option<bool>,
}

/// Combo together with the products it bundles
#[derive(Clone, Debug, Serialize)]
pub struct ComboWithProducts {
    #[serde(flatten)]
    pub combo: Combo,
    pub products: Vec<Product>,
    pub original_price: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Fail)]
pub enum ComboRuleViolation {
    #[fail(display = "combo must contain at least {} distinct products", _0)]
    TooFewProducts(usize),
    #[fail(display = "product {} is not a published product of the producer", _0)]
    ForeignProduct(ProductId),
    #[fail(display = "combo price must be lower than the sum of product prices ({})", _0)]
    PriceNotDiscounted(Amount),
    #[fail(display = "combo price must be positive")]
    ZeroPrice,
    #[fail(display = "sum of product prices overflowed")]
    Overflow,
}

/// Checks the bundle rules for `products` owned by `producer_id` sold at `price`.
/// Returns the undiscounted sum of the product prices.
pub fn check_combo(producer_id: UserId, price: Amount, products: &[Product]) -> Result<Amount, ComboRuleViolation> {
    let distinct: HashSet<ProductId> = products.iter().map(|p| p.id).collect();
    if distinct.len() < MIN_COMBO_PRODUCTS || distinct.len() != products.len() {
        return Err(ComboRuleViolation::TooFewProducts(MIN_COMBO_PRODUCTS));
    }

    if let Some(product) = products.iter().find(|p| p.producer_id != producer_id || !p.is_published()) {
        return Err(ComboRuleViolation::ForeignProduct(product.id));
    }

    if price == Amount::zero() {
        return Err(ComboRuleViolation::ZeroPrice);
    }

    let total = Amount::checked_sum(products.iter().map(|p| p.price)).ok_or(ComboRuleViolation::Overflow)?;
    if price >= total {
        return Err(ComboRuleViolation::PriceNotDiscounted(total));
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingStatus, ProductKind};
    use chrono::Utc;

    fn product(producer_id: UserId, price: u64) -> Product {
        let now = Utc::now().naive_utc();
        Product {
            id: ProductId::generate(),
            producer_id,
            title: "Rust course".to_string(),
            description: String::new(),
            kind: ProductKind::Course,
            price: Amount::new(price),
            status: ListingStatus::Published,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_valid_combo() {
        let producer = UserId::generate();
        let products = vec![product(producer, 5_000), product(producer, 3_000)];
        assert_eq!(check_combo(producer, Amount::new(7_999), &products), Ok(Amount::new(8_000)));
    }

    #[test]
    fn test_combo_price_must_be_discounted() {
        let producer = UserId::generate();
        let products = vec![product(producer, 5_000), product(producer, 3_000)];
        assert_eq!(
            check_combo(producer, Amount::new(8_000), &products),
            Err(ComboRuleViolation::PriceNotDiscounted(Amount::new(8_000)))
        );
        assert_eq!(check_combo(producer, Amount::zero(), &products), Err(ComboRuleViolation::ZeroPrice));
    }

    #[test]
    fn test_combo_needs_two_distinct_products() {
        let producer = UserId::generate();
        let single = product(producer, 5_000);
        assert_eq!(
            check_combo(producer, Amount::new(1_000), &[single.clone()]),
            Err(ComboRuleViolation::TooFewProducts(2))
        );
        assert_eq!(
            check_combo(producer, Amount::new(1_000), &[single.clone(), single]),
            Err(ComboRuleViolation::TooFewProducts(2))
        );
    }

    #[test]
    fn test_combo_rejects_foreign_or_unpublished_products() {
        let producer = UserId::generate();
        let foreign = product(UserId::generate(), 3_000);
        let foreign_id = foreign.id;
        let products = vec![product(producer, 5_000), foreign];
        assert_eq!(
            check_combo(producer, Amount::new(1_000), &products),
            Err(ComboRuleViolation::ForeignProduct(foreign_id))
        );

        let mut draft = product(producer, 3_000);
        draft.status = ListingStatus::Draft;
        let draft_id = draft.id;
        let products = vec![product(producer, 5_000), draft];
        assert_eq!(
            check_combo(producer, Amount::new(1_000), &products),
            Err(ComboRuleViolation::ForeignProduct(draft_id))
        );
    }
}
