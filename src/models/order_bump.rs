use chrono::NaiveDateTime;

use crate::models::{Amount, Product, ProductId, UserId};
use crate::schema::order_bumps;

uuid_id!(OrderBumpId, order_bump_id_sql);

/// Upsell offered at checkout of `product_id`: `offer_product_id` at a discounted `price`
#[derive(Clone, Debug, Serialize, Queryable)]
pub struct OrderBump {
    pub id: OrderBumpId,
    pub product_id: ProductId,
    pub offer_product_id: ProductId,
    pub producer_id: UserId,
    pub headline: String,
    pub price: Amount,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "order_bumps"]
pub struct NewOrderBump {
    pub id: OrderBumpId,
    pub product_id: ProductId,
    pub offer_product_id: ProductId,
    pub producer_id: UserId,
    pub headline: String,
    pub price: Amount,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Fail)]
pub enum OrderBumpRuleViolation {
    #[fail(display = "product {} does not belong to the producer", _0)]
    ForeignProduct(ProductId),
    #[fail(display = "offered product {} is not published", _0)]
    OfferNotPublished(ProductId),
    #[fail(display = "a product cannot be offered as a bump to itself")]
    SameProduct,
    #[fail(display = "bump price must be positive and lower than {}", _0)]
    PriceNotDiscounted(Amount),
}

/// Checks that `producer_id` may offer `offer` at `price` when `trigger` is bought
pub fn check_order_bump(producer_id: UserId, trigger: &Product, offer: &Product, price: Amount) -> Result<(), OrderBumpRuleViolation> {
    if trigger.id == offer.id {
        return Err(OrderBumpRuleViolation::SameProduct);
    }
    if trigger.producer_id != producer_id {
        return Err(OrderBumpRuleViolation::ForeignProduct(trigger.id));
    }
    if offer.producer_id != producer_id {
        return Err(OrderBumpRuleViolation::ForeignProduct(offer.id));
    }
    if !offer.is_published() {
        return Err(OrderBumpRuleViolation::OfferNotPublished(offer.id));
    }
    if price == Amount::zero() || price >= offer.price {
        return Err(OrderBumpRuleViolation::PriceNotDiscounted(offer.price));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingStatus, ProductKind};
    use chrono::Utc;

    fn product(producer_id: UserId, price: u64, status: ListingStatus) -> Product {
        let now = Utc::now().naive_utc();
        Product {
            id: ProductId::generate(),
            producer_id,
            title: "E-book".to_string(),
            description: String::new(),
            kind: ProductKind::Ebook,
            price: Amount::new(price),
            status,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_bump_price_is_discounted() {
        let producer = UserId::generate();
        let trigger = product(producer, 10_000, ListingStatus::Published);
        let offer = product(producer, 2_000, ListingStatus::Published);

        assert_eq!(check_order_bump(producer, &trigger, &offer, Amount::new(1_990)), Ok(()));
        assert_eq!(
            check_order_bump(producer, &trigger, &offer, Amount::new(2_000)),
            Err(OrderBumpRuleViolation::PriceNotDiscounted(Amount::new(2_000)))
        );
        assert!(check_order_bump(producer, &trigger, &offer, Amount::zero()).is_err());
    }

    #[test]
    fn test_bump_products_ownership() {
        let producer = UserId::generate();
        let trigger = product(producer, 10_000, ListingStatus::Published);
        let foreign = product(UserId::generate(), 2_000, ListingStatus::Published);
        assert_eq!(
            check_order_bump(producer, &trigger, &foreign, Amount::new(100)),
            Err(OrderBumpRuleViolation::ForeignProduct(foreign.id))
        );

        let draft = product(producer, 2_000, ListingStatus::Draft);
        assert_eq!(
            check_order_bump(producer, &trigger, &draft, Amount::new(100)),
            Err(OrderBumpRuleViolation::OfferNotPublished(draft.id))
        );

        assert_eq!(
            check_order_bump(producer, &trigger, &trigger, Amount::new(100)),
            Err(OrderBumpRuleViolation::SameProduct)
        );
    }
}
