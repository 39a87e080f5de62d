use chrono::NaiveDateTime;

use crate::models::{Amount, Product, ProductId, UserId};
use crate::schema::cart_items;

uuid_id!(CartItemId, cart_item_id_sql);

#[derive(Clone, Debug, Serialize, Queryable)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "cart_items"]
pub struct NewCartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
}

impl NewCartItem {
    pub fn new(user_id: UserId, product_id: ProductId) -> Self {
        NewCartItem {
            id: CartItemId::generate(),
            user_id,
            product_id,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    pub products: Vec<Product>,
    pub total: Amount,
}

impl Cart {
    pub fn new(products: Vec<Product>) -> Option<Self> {
        let total = Amount::checked_sum(products.iter().map(|p| p.price))?;
        Some(Cart { products, total })
    }
}
