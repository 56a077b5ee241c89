// Shared fixtures for the domain integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use edustore::contact::Contact;
use edustore::notify::{NotifyError, OtpMessage, OtpNotifier};
use edustore::{AppContext, Claims, TokenKind};
use edustore_core::db::models::{Product, Role, User};
use edustore_core::db::adapter::Adapter;
use edustore_core::utils::{generate_id, now_millis};
use edustore_core::{EduStoreOptions, Schema};
use edustore_memory::MemoryAdapter;
use edustore_sqlx::SqlxAdapter;

pub const SECRET: &str = "integration-test-secret-of-sufficient-length";

/// Records every code it is asked to deliver. With `fail` set it records and
/// then reports a delivery failure.
#[derive(Default)]
pub struct CapturingNotifier {
    sent: Mutex<Vec<(Contact, OtpMessage)>>,
    pub fail: bool,
}

impl CapturingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, message)| message.code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl OtpNotifier for CapturingNotifier {
    async fn send_otp(&self, contact: &Contact, message: &OtpMessage) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((contact.clone(), message.clone()));
        if self.fail {
            Err(NotifyError::Sms("provider down".into()))
        } else {
            Ok(())
        }
    }
}

pub struct Harness {
    pub ctx: Arc<AppContext>,
    pub notifier: Arc<CapturingNotifier>,
    pub adapter: MemoryAdapter,
}

pub fn harness() -> Harness {
    harness_with(CapturingNotifier::default())
}

pub fn harness_with(notifier: CapturingNotifier) -> Harness {
    let adapter = MemoryAdapter::with_schema(&Schema::edustore());
    let notifier = Arc::new(notifier);
    let ctx = AppContext::new(EduStoreOptions::new(SECRET), Arc::new(adapter.clone()))
        .with_notifier(notifier.clone());
    Harness {
        ctx: Arc::new(ctx),
        notifier,
        adapter,
    }
}

/// Same domain over SQLite in memory, for checks that must hold on a real
/// database too.
pub async fn sqlite_context() -> Arc<AppContext> {
    let adapter = SqlxAdapter::connect("sqlite::memory:").await.unwrap();
    adapter.create_schema(&Schema::edustore()).await.unwrap();
    Arc::new(AppContext::new(EduStoreOptions::new(SECRET), Arc::new(adapter)))
}

/// Insert a verified user directly and return it with matching claims.
pub async fn insert_user(ctx: &AppContext, email: &str, role: Role) -> (User, Claims) {
    let now = now_millis();
    let user = User {
        id: generate_id(),
        email: Some(email.to_string()),
        phone: None,
        first_name: String::new(),
        last_name: String::new(),
        role,
        is_email_verified: true,
        is_phone_verified: false,
        created_at: now,
        updated_at: now,
    };
    let user = ctx.store.create_user(&user).await.unwrap();
    let claims = Claims::for_user(&user, TokenKind::Session);
    (user, claims)
}

pub async fn insert_product(ctx: &AppContext, title: &str, price: f64) -> Product {
    let now = now_millis();
    let product = Product {
        id: generate_id(),
        title: title.to_string(),
        category: "Past Papers".to_string(),
        price,
        file_path: Some(format!("uploads/{}.pdf", title.to_lowercase().replace(' ', "-"))),
        created_at: now,
        updated_at: now,
    };
    ctx.store.create_product(&product).await.unwrap()
}

impl Harness {
    pub async fn user(&self, email: &str, role: Role) -> (User, Claims) {
        insert_user(&self.ctx, email, role).await
    }

    pub async fn product(&self, title: &str, price: f64) -> Product {
        insert_product(&self.ctx, title, price).await
    }
}
