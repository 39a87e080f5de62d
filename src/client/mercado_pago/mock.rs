//! In-memory Mercado Pago, used in tests and when the real gateway is disabled

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use failure::Fail;
use futures::{future, Future};

use super::error::*;
use super::types::*;
use super::MercadoPagoClient;

const KEEP_PREFERENCES: usize = 100;

#[derive(Clone, Default)]
struct State {
    preferences: Vec<CreatePreference>,
    payments: HashMap<String, Payment>,
}

#[derive(Clone, Default)]
pub struct MercadoPagoClientMock {
    state: Arc<Mutex<State>>,
}

impl MercadoPagoClientMock {
    fn state(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes `payment` visible to `get_payment`
    pub fn add_payment(&self, payment: Payment) {
        self.state().payments.insert(payment.id.to_string(), payment);
    }

    pub fn preferences(&self) -> Vec<CreatePreference> {
        self.state().preferences.clone()
    }
}

impl MercadoPagoClient for MercadoPagoClientMock {
    fn create_preference(&self, input: CreatePreference) -> Box<dyn Future<Item = Preference, Error = Error> + Send> {
        info!("Mercado Pago is disabled, creating local preference for {}", input.external_reference);
        let preference = Preference {
            id: format!("local-{}", input.external_reference),
            init_point: format!("{}?checkout={}", input.back_urls.success, input.external_reference),
            sandbox_init_point: None,
        };
        let mut state = self.state();
        if state.preferences.len() >= KEEP_PREFERENCES {
            state.preferences.remove(0);
        }
        state.preferences.push(input);
        Box::new(future::ok(preference))
    }

    fn get_payment(&self, payment_id: String) -> Box<dyn Future<Item = Payment, Error = Error> + Send> {
        let payment = self.state().payments.get(&payment_id).cloned();
        Box::new(match payment {
            Some(payment) => future::ok(payment),
            None => {
                let e = format_err!("Payment {} not found", payment_id);
                future::err(ectx!(err e, ErrorKind::NotFound => payment_id))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::CheckoutId;

    #[test]
    fn test_mock_records_preferences_and_serves_payments() {
        let client = MercadoPagoClientMock::default();
        let checkout_id = CheckoutId::generate();
        let input = CreatePreference::new(
            checkout_id,
            vec![],
            "buyer@eduplay.test".to_string(),
            "http://localhost/notify".to_string(),
            "http://localhost/done".to_string(),
        );
        let preference = client.create_preference(input).wait().unwrap();
        assert!(preference.init_point.contains(&checkout_id.to_string()));
        assert_eq!(client.preferences().len(), 1);

        assert!(client.get_payment("7".to_string()).wait().is_err());
        client.add_payment(Payment {
            id: 7,
            status: "approved".to_string(),
            status_detail: None,
            external_reference: Some(checkout_id.to_string()),
            transaction_amount: Some(10.0),
        });
        let payment = client.get_payment("7".to_string()).wait().unwrap();
        assert_eq!(payment.checkout_id(), Some(checkout_id));
    }
}
