//! Twilio WhatsApp delivery client.
//!
//! Sends messages through the Twilio Messages API. Without credentials the
//! sender runs in demo mode: sends are logged, never transmitted.

/// Twilio credentials for the WhatsApp channel
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl TwilioCredentials {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            account_sid: std::env::var("TWILIO_ACCOUNT_SID").ok()?,
            auth_token: std::env::var("TWILIO_AUTH_TOKEN").ok()?,
            from_number: std::env::var("TWILIO_WHATSAPP_NUMBER").ok()?,
        })
    }
}

/// Outcome of a single send attempt
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Provider message sid; absent for simulated sends
    pub sid: Option<String>,
    pub simulated: bool,
}

/// The slice of Twilio's message resource we care about
#[derive(Debug, serde::Deserialize)]
struct TwilioMessage {
    sid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderMode {
    Live,
    Demo,
}

impl SenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderMode::Live => "production",
            SenderMode::Demo => "demo",
        }
    }
}

pub enum WhatsAppSender {
    Twilio {
        client: reqwest::Client,
        credentials: TwilioCredentials,
    },
    Demo,
    #[cfg(test)]
    Mock(MockSender),
}

impl WhatsAppSender {
    /// Live when all three Twilio env vars are present, demo otherwise.
    pub fn from_env() -> Self {
        match TwilioCredentials::from_env() {
            Some(credentials) => Self::Twilio {
                client: reqwest::Client::new(),
                credentials,
            },
            None => Self::Demo,
        }
    }

    pub fn mode(&self) -> SenderMode {
        match self {
            Self::Twilio { .. } => SenderMode::Live,
            Self::Demo => SenderMode::Demo,
            #[cfg(test)]
            Self::Mock(_) => SenderMode::Live,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.mode() == SenderMode::Live
    }

    /// One attempt, no retry. Callers decide what a failure means.
    pub async fn send(&self, phone: &str, message: &str) -> Result<DeliveryReceipt, String> {
        match self {
            Self::Twilio {
                client,
                credentials,
            } => send_via_twilio(client, credentials, phone, message).await,
            Self::Demo => {
                log::info!("[WHATSAPP] [DEMO MODE] Would send to {}: {}", phone, message);
                Ok(DeliveryReceipt {
                    sid: None,
                    simulated: true,
                })
            }
            #[cfg(test)]
            Self::Mock(mock) => mock.send(phone, message),
        }
    }
}

async fn send_via_twilio(
    client: &reqwest::Client,
    credentials: &TwilioCredentials,
    phone: &str,
    message: &str,
) -> Result<DeliveryReceipt, String> {
    let url = format!(
        "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
        credentials.account_sid
    );
    let to = format!("whatsapp:{}", normalize_phone(phone));
    let from = format!("whatsapp:{}", credentials.from_number);
    let params = [("To", to.as_str()), ("From", from.as_str()), ("Body", message)];

    let response = client
        .post(&url)
        .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
        .form(&params)
        .send()
        .await
        .map_err(|e| format!("Twilio request failed: {}", e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read response: {}", e))?;

    if !status.is_success() {
        let json: serde_json::Value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
        return Err(format!(
            "Twilio API error ({}): {}",
            status,
            json.get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_else(|| truncate_error(&body))
        ));
    }

    let created: TwilioMessage =
        serde_json::from_str(&body).map_err(|e| format!("Invalid JSON: {}", e))?;
    Ok(DeliveryReceipt {
        sid: created.sid,
        simulated: false,
    })
}

/// Strips everything but ASCII digits.
pub fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Twilio wants E.164: digits with a leading `+`.
pub fn normalize_phone(phone: &str) -> String {
    format!("+{}", digits_only(phone))
}

fn truncate_error(s: &str) -> &str {
    if s.len() <= 200 {
        return s;
    }
    // Byte 200 may fall inside a multi-byte char; back up to a boundary.
    let mut end = 200;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// =====================================================
// Test Mock
// =====================================================

#[cfg(test)]
pub struct MockSender {
    calls: std::sync::Mutex<Vec<(String, String)>>,
    fail_numbers: Vec<String>,
}

#[cfg(test)]
impl MockSender {
    fn send(&self, phone: &str, message: &str) -> Result<DeliveryReceipt, String> {
        self.calls
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        if self.fail_numbers.iter().any(|n| n == phone) {
            return Err(format!("simulated delivery failure to {}", phone));
        }
        Ok(DeliveryReceipt {
            sid: Some("SM_mock".to_string()),
            simulated: false,
        })
    }
}

#[cfg(test)]
impl WhatsAppSender {
    pub fn mock() -> Self {
        Self::mock_failing(&[])
    }

    /// Mock that fails every send to the listed phone numbers.
    pub fn mock_failing(numbers: &[&str]) -> Self {
        Self::Mock(MockSender {
            calls: std::sync::Mutex::new(Vec::new()),
            fail_numbers: numbers.iter().map(|n| n.to_string()).collect(),
        })
    }

    /// All (phone, message) pairs attempted so far, in order.
    pub fn mock_calls(&self) -> Vec<(String, String)> {
        match self {
            Self::Mock(mock) => mock.calls.lock().unwrap().clone(),
            _ => Vec::new(),
        }
    }
}
