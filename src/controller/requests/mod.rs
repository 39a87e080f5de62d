//! Request bodies accepted by the api

use crate::models::*;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must have from 8 to 128 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Name must have from 1 to 100 characters"))]
    pub name: String,
    /// Buyer if not given
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must have from 1 to 100 characters"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePayoutRequest {
    #[validate(length(min = 1, max = 140))]
    pub pix_key: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub bank_name: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub bank_agency: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub bank_account: Option<String>,
}

impl From<UpdatePayoutRequest> for UpdateUser {
    fn from(payload: UpdatePayoutRequest) -> Self {
        let UpdatePayoutRequest {
            pix_key,
            bank_name,
            bank_agency,
            bank_account,
        } = payload;
        UpdateUser {
            name: None,
            pix_key,
            bank_name,
            bank_agency,
            bank_account,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetStatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Title must have from 1 to 200 characters"))]
    pub title: String,
    #[validate(length(max = 10000))]
    pub description: String,
    pub kind: ProductKind,
    pub price: Amount,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Title must have from 1 to 200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub kind: Option<ProductKind>,
    pub price: Option<Amount>,
}

impl From<UpdateProductRequest> for UpdateProduct {
    fn from(payload: UpdateProductRequest) -> Self {
        let UpdateProductRequest {
            title,
            description,
            kind,
            price,
        } = payload;
        UpdateProduct {
            title,
            description,
            kind,
            price,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(min = 1, max = 1000, message = "Reason must have from 1 to 1000 characters"))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: ProductId,
}

/// Order bumps accepted at checkout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub order_bump_ids: Vec<OrderBumpId>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateComboRequest {
    #[validate(length(min = 1, max = 200, message = "Title must have from 1 to 200 characters"))]
    pub title: String,
    #[validate(length(max = 10000))]
    pub description: String,
    pub price: Amount,
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateComboRequest {
    #[validate(length(min = 1, max = 200, message = "Title must have from 1 to 200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub price: Option<Amount>,
    pub active: Option<bool>,
}

impl From<UpdateComboRequest> for UpdateCombo {
    fn from(payload: UpdateComboRequest) -> Self {
        let UpdateComboRequest {
            title,
            description,
            price,
            active,
        } = payload;
        UpdateCombo {
            title,
            description,
            price,
            active,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderBumpRequest {
    pub product_id: ProductId,
    pub offer_product_id: ProductId,
    #[validate(length(min = 1, max = 200, message = "Headline must have from 1 to 200 characters"))]
    pub headline: String,
    pub price: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAppRequest {
    #[validate(length(min = 1, max = 200, message = "Name must have from 1 to 200 characters"))]
    pub name: String,
    #[validate(length(max = 10000))]
    pub description: String,
    pub platform: AppPlatform,
    #[validate(url(message = "Invalid download url"))]
    pub download_url: String,
    pub price: Amount,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateAppRequest {
    #[validate(length(min = 1, max = 200, message = "Name must have from 1 to 200 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub platform: Option<AppPlatform>,
    #[validate(url(message = "Invalid download url"))]
    pub download_url: Option<String>,
    pub price: Option<Amount>,
}

impl From<UpdateAppRequest> for UpdateApp {
    fn from(payload: UpdateAppRequest) -> Self {
        let UpdateAppRequest {
            name,
            description,
            platform,
            download_url,
            price,
        } = payload;
        UpdateApp {
            name,
            description,
            platform,
            download_url,
            price,
        }
    }
}
