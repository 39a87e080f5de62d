//! Log-only email client, used in tests and when sending is disabled

use std::sync::{Arc, Mutex};

use futures::{future, Future};

use super::error::*;
use super::types::*;
use super::EmailClient;

/// Emails kept for inspection, older ones are dropped
const KEEP_SENT: usize = 100;

#[derive(Clone, Default)]
pub struct EmailClientMock {
    sent: Arc<Mutex<Vec<Email>>>,
}

impl EmailClientMock {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl EmailClient for EmailClientMock {
    fn send(&self, email: Email) -> Box<dyn Future<Item = (), Error = Error> + Send> {
        info!("Email to {} not sent, sending is disabled: {}", email.to, email.subject);
        if let Ok(mut sent) = self.sent.lock() {
            if sent.len() >= KEEP_SENT {
                sent.remove(0);
            }
            sent.push(email);
        }
        Box::new(future::ok(()))
    }
}
