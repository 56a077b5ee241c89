// OTP delivery.
//
// `OtpNotifier` is the seam the sign-in flow talks to. `ChannelNotifier`
// routes a code to the email or SMS transport; when the SMS transport fails
// it retries through carrier email-to-SMS gateways and stops at the first
// gateway that accepts the message.

use std::sync::Arc;

use async_trait::async_trait;

use crate::contact::Contact;

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("email delivery failed: {0}")]
    Email(String),

    #[error("sms delivery failed: {0}")]
    Sms(String),

    #[error("no carrier gateway accepted the message")]
    GatewaysExhausted,
}

/// The content of one code delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpMessage {
    pub code: String,
    pub valid_for_minutes: u64,
}

impl OtpMessage {
    pub fn new(code: impl Into<String>, expires_in_secs: u64) -> Self {
        Self {
            code: code.into(),
            valid_for_minutes: expires_in_secs.div_ceil(60),
        }
    }

    pub fn sms_text(&self) -> String {
        format!(
            "Your EduStore OTP code is: {}. Valid for {} minutes.",
            self.code, self.valid_for_minutes
        )
    }

    pub fn email_subject(&self) -> &'static str {
        "Your OTP Code for EduStore"
    }

    pub fn email_body(&self) -> String {
        format!(
            "Your one-time code is {}.\n\nIt expires in {} minutes. If you did not request it, you can ignore this email.",
            self.code, self.valid_for_minutes
        )
    }
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotifyError>;
}

/// Delivers an issued code to its contact.
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn send_otp(&self, contact: &Contact, message: &OtpMessage) -> Result<(), NotifyError>;
}

/// An email-to-SMS bridge run by a mobile carrier: `<digits>@<domain>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierGateway {
    pub carrier: &'static str,
    pub domain: &'static str,
}

impl CarrierGateway {
    pub fn address(&self, digits: &str) -> String {
        format!("{digits}@{}", self.domain)
    }
}

/// US carrier gateways, tried in this order.
pub fn default_gateways() -> Vec<CarrierGateway> {
    [
        ("verizon", "vtext.com"),
        ("att", "txt.att.net"),
        ("tmobile", "tmomail.net"),
        ("sprint", "messaging.sprintpcs.com"),
        ("boost", "myboostmobile.com"),
        ("cricket", "sms.cricketwireless.net"),
        ("metro", "mymetropcs.com"),
        ("uscellular", "email.uscc.net"),
    ]
    .into_iter()
    .map(|(carrier, domain)| CarrierGateway { carrier, domain })
    .collect()
}

pub struct ChannelNotifier {
    email: Arc<dyn EmailTransport>,
    sms: Arc<dyn SmsTransport>,
    gateways: Vec<CarrierGateway>,
}

impl std::fmt::Debug for ChannelNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelNotifier")
            .field("gateways", &self.gateways.len())
            .finish()
    }
}

impl ChannelNotifier {
    pub fn new(email: Arc<dyn EmailTransport>, sms: Arc<dyn SmsTransport>) -> Self {
        Self {
            email,
            sms,
            gateways: default_gateways(),
        }
    }

    /// Both channels on [`LogTransport`].
    pub fn logging() -> Self {
        let transport = Arc::new(LogTransport);
        Self::new(transport.clone(), transport)
    }

    pub fn with_gateways(mut self, gateways: Vec<CarrierGateway>) -> Self {
        self.gateways = gateways;
        self
    }

    async fn send_via_gateways(&self, digits: &str, message: &OtpMessage) -> Result<(), NotifyError> {
        let text = message.sms_text();
        for gateway in &self.gateways {
            let address = gateway.address(digits);
            match self.email.send_email(&address, message.email_subject(), &text).await {
                Ok(()) => {
                    tracing::debug!(carrier = gateway.carrier, "otp delivered via carrier gateway");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(carrier = gateway.carrier, error = %e, "carrier gateway refused");
                }
            }
        }
        Err(NotifyError::GatewaysExhausted)
    }
}

#[async_trait]
impl OtpNotifier for ChannelNotifier {
    async fn send_otp(&self, contact: &Contact, message: &OtpMessage) -> Result<(), NotifyError> {
        match contact {
            Contact::Email(address) => {
                self.email
                    .send_email(address, message.email_subject(), &message.email_body())
                    .await
            }
            Contact::Phone(digits) => match self.sms.send_sms(digits, &message.sms_text()).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "sms transport failed, trying carrier gateways");
                    self.send_via_gateways(digits, message).await
                }
            },
        }
    }
}

/// Transport that only logs the send. The message body is never logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::info!(to, subject, "email queued (log transport)");
        Ok(())
    }
}

#[async_trait]
impl SmsTransport for LogTransport {
    async fn send_sms(&self, to: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::info!(to, "sms queued (log transport)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Email transport that refuses every address except those ending in `accept`.
    #[derive(Default)]
    struct PickyEmail {
        accept: Option<&'static str>,
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmailTransport for PickyEmail {
        async fn send_email(&self, to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            self.attempts.lock().unwrap().push(to.to_string());
            match self.accept {
                Some(domain) if to.ends_with(domain) => Ok(()),
                _ => Err(NotifyError::Email("refused".into())),
            }
        }
    }

    struct BrokenSms;

    #[async_trait]
    impl SmsTransport for BrokenSms {
        async fn send_sms(&self, _to: &str, _body: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Sms("provider down".into()))
        }
    }

    fn message() -> OtpMessage {
        OtpMessage::new("482913", 300)
    }

    #[test]
    fn test_message_texts() {
        let m = message();
        assert_eq!(m.valid_for_minutes, 5);
        assert_eq!(
            m.sms_text(),
            "Your EduStore OTP code is: 482913. Valid for 5 minutes."
        );
        assert_eq!(m.email_subject(), "Your OTP Code for EduStore");
        assert!(m.email_body().contains("482913"));
    }

    #[tokio::test]
    async fn test_sms_failure_falls_back_to_gateways_in_order() {
        let email = Arc::new(PickyEmail {
            accept: Some("tmomail.net"),
            ..Default::default()
        });
        let notifier = ChannelNotifier::new(email.clone(), Arc::new(BrokenSms));
        let contact = Contact::phone("5551234567").unwrap();

        notifier.send_otp(&contact, &message()).await.unwrap();

        let attempts = email.attempts.lock().unwrap().clone();
        assert_eq!(
            attempts,
            vec![
                "5551234567@vtext.com",
                "5551234567@txt.att.net",
                "5551234567@tmomail.net",
            ]
        );
    }

    #[tokio::test]
    async fn test_all_gateways_refusing_is_an_error() {
        let email = Arc::new(PickyEmail::default());
        let notifier = ChannelNotifier::new(email.clone(), Arc::new(BrokenSms));
        let contact = Contact::phone("5551234567").unwrap();

        let err = notifier.send_otp(&contact, &message()).await.unwrap_err();
        assert!(matches!(err, NotifyError::GatewaysExhausted));
        assert_eq!(email.attempts.lock().unwrap().len(), default_gateways().len());
    }

    #[tokio::test]
    async fn test_email_contact_uses_email_transport() {
        let email = Arc::new(PickyEmail {
            accept: Some("example.com"),
            ..Default::default()
        });
        let notifier = ChannelNotifier::new(email.clone(), Arc::new(BrokenSms));
        let contact = Contact::email("ada@example.com").unwrap();

        notifier.send_otp(&contact, &message()).await.unwrap();
        assert_eq!(*email.attempts.lock().unwrap(), vec!["ada@example.com"]);
    }

    #[tokio::test]
    async fn test_logging_notifier_accepts_everything() {
        let notifier = ChannelNotifier::logging();
        let contact = Contact::phone("5551234567").unwrap();
        assert!(notifier.send_otp(&contact, &message()).await.is_ok());
    }
}
