use std::collections::HashMap;

use serde_json;

use crate::models::{Amount, CheckoutId, OrderStatus};

pub const CURRENCY_BRL: &str = "BRL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub currency_id: String,
    pub unit_price: f64,
}

impl PreferenceItem {
    pub fn new(id: String, title: String, price: Amount) -> Self {
        PreferenceItem {
            id,
            title,
            quantity: 1,
            currency_id: CURRENCY_BRL.to_string(),
            unit_price: price.inner() as f64 / 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payer {
    pub email: String,
}

/// Body of `POST /checkout/preferences`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatePreference {
    pub items: Vec<PreferenceItem>,
    pub external_reference: String,
    pub notification_url: String,
    pub back_urls: BackUrls,
    pub auto_return: String,
    pub payer: Option<Payer>,
}

impl CreatePreference {
    /// Preference paying all orders of `checkout_id`
    pub fn new(checkout_id: CheckoutId, items: Vec<PreferenceItem>, payer_email: String, notification_url: String, success_url: String) -> Self {
        CreatePreference {
            items,
            external_reference: checkout_id.to_string(),
            notification_url,
            back_urls: BackUrls {
                success: success_url.clone(),
                failure: success_url.clone(),
                pending: success_url,
            },
            auto_return: "approved".to_string(),
            payer: Some(Payer { email: payer_email }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preference {
    pub id: String,
    pub init_point: String,
    pub sandbox_init_point: Option<String>,
}

/// Payment as returned by `GET /v1/payments/:id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: u64,
    pub status: String,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
    pub transaction_amount: Option<f64>,
}

impl Payment {
    /// Order status a payment status leads to, None for statuses that change nothing
    pub fn order_status(&self) -> Option<OrderStatus> {
        match self.status.as_str() {
            "approved" => Some(OrderStatus::Approved),
            "rejected" | "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" | "charged_back" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    pub fn checkout_id(&self) -> Option<CheckoutId> {
        self.external_reference.as_ref().and_then(|reference| reference.parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationData {
    pub id: serde_json::Value,
}

/// Webhook body, `{"type": "payment", "data": {"id": ...}}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub action: Option<String>,
    pub data: Option<NotificationData>,
}

impl Notification {
    /// Id of the notified payment. Mercado Pago sends it either as a number or as a string.
    pub fn payment_id(&self) -> Option<String> {
        if self.kind.as_ref().map(|kind| kind != "payment").unwrap_or(false) {
            return None;
        }
        self.data.as_ref().and_then(|data| match data.id {
            serde_json::Value::String(ref id) if !id.is_empty() => Some(id.clone()),
            serde_json::Value::Number(ref id) => Some(id.to_string()),
            _ => None,
        })
    }

    /// Notification sent as `?type=payment&data.id=...` or the older `?topic=payment&id=...`
    pub fn from_query(params: &HashMap<String, String>) -> Option<Notification> {
        let kind = params.get("type").or_else(|| params.get("topic")).cloned();
        let id = params.get("data.id").or_else(|| params.get("id")).cloned()?;
        Some(Notification {
            kind,
            action: None,
            data: Some(NotificationData {
                id: serde_json::Value::String(id),
            }),
        })
    }
}
