/// Plain text email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl Email {
    pub fn new(to: String, subject: String, text: String) -> Self {
        Email { to, subject, text }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Address {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Personalization {
    pub to: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Content {
    #[serde(rename = "type")]
    pub content_type: String,
    pub value: String,
}

/// Body of SendGrid `POST /v3/mail/send`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendMail {
    pub personalizations: Vec<Personalization>,
    pub from: Address,
    pub subject: String,
    pub content: Vec<Content>,
}

impl SendMail {
    pub fn new(from: String, email: Email) -> Self {
        let Email { to, subject, text } = email;
        SendMail {
            personalizations: vec![Personalization {
                to: vec![Address { email: to }],
            }],
            from: Address { email: from },
            subject,
            content: vec![Content {
                content_type: "text/plain".to_string(),
                value: text,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[test]
    fn test_send_mail_body() {
        let email = Email::new("buyer@eduplay.test".to_string(), "Receipt".to_string(), "Thanks".to_string());
        let body = serde_json::to_value(SendMail::new("no-reply@eduplay.com.br".to_string(), email)).unwrap();
        assert_eq!(
            body,
            json!({
                "personalizations": [{"to": [{"email": "buyer@eduplay.test"}]}],
                "from": {"email": "no-reply@eduplay.com.br"},
                "subject": "Receipt",
                "content": [{"type": "text/plain", "value": "Thanks"}]
            })
        );
    }
}
