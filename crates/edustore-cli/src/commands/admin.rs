// `edustore create-superadmin`: bootstrap the first SUPERADMIN.
//
// SUPERADMIN accounts cannot be created over HTTP, so the first one comes
// from here. An existing account with the same email is promoted in place.

use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;

use edustore::contact::Contact;
use edustore::{AdapterStore, Store, StoreError};
use edustore_core::db::models::{Role, User};
use edustore_core::utils::{generate_id, now_millis};

use super::{connect, CliResult, ConfigArgs};

#[derive(Args)]
pub struct CreateSuperadminArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Email address used to sign in with a one-time code
    #[arg(long)]
    email: String,

    #[arg(long, default_value = "")]
    first_name: String,

    #[arg(long, default_value = "")]
    last_name: String,
}

pub async fn run(args: CreateSuperadminArgs) -> CliResult {
    let contact = Contact::email(args.email.trim())?;
    let options = args.config.read_options()?;
    let (adapter, _) = connect(&options).await?;
    let store = AdapterStore::new(adapter.clone());

    let result = promote_or_create(
        &store,
        &contact,
        args.first_name.trim(),
        args.last_name.trim(),
        now_millis(),
    )
    .await;
    adapter.close().await;

    let (user, created) = result?;
    let verb = if created { "Created" } else { "Promoted" };
    println!(
        "{} {} SUPERADMIN {} ({})",
        "✔".green(),
        verb,
        contact.value().yellow(),
        user.id.dimmed()
    );
    Ok(())
}

/// Returns the SUPERADMIN and whether it had to be created.
async fn promote_or_create(
    store: &dyn Store,
    contact: &Contact,
    first_name: &str,
    last_name: &str,
    now: DateTime<Utc>,
) -> Result<(User, bool), StoreError> {
    if let Some(existing) = store.find_user_by_contact(contact).await? {
        if let Some(user) = store.set_user_role(&existing.id, Role::SuperAdmin, now).await? {
            return Ok((user, false));
        }
    }

    let user = User {
        id: generate_id(),
        email: Some(contact.value().to_string()),
        phone: None,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        role: Role::SuperAdmin,
        is_email_verified: true,
        is_phone_verified: false,
        created_at: now,
        updated_at: now,
    };
    let user = store.create_user(&user).await?;
    Ok((user, true))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use edustore_core::Schema;
    use edustore_memory::MemoryAdapter;

    fn memory_store() -> AdapterStore {
        AdapterStore::new(Arc::new(MemoryAdapter::with_schema(&Schema::edustore())))
    }

    #[tokio::test]
    async fn test_creates_superadmin() {
        let store = memory_store();
        let contact = Contact::email("Root@EduStore.io").unwrap();

        let (user, created) = promote_or_create(&store, &contact, "Ada", "", Utc::now())
            .await
            .unwrap();
        assert!(created);
        assert_eq!(user.role, Role::SuperAdmin);
        assert_eq!(user.email.as_deref(), Some("root@edustore.io"));
        assert!(user.is_email_verified);
    }

    #[tokio::test]
    async fn test_promotes_existing_user() {
        let store = memory_store();
        let contact = Contact::email("owner@edustore.io").unwrap();
        let now = Utc::now();
        let (first, _) = promote_or_create(&store, &contact, "", "", now).await.unwrap();
        store
            .set_user_role(&first.id, Role::User, now)
            .await
            .unwrap();

        let (user, created) = promote_or_create(&store, &contact, "", "", now)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(user.id, first.id);
        assert_eq!(user.role, Role::SuperAdmin);
    }
}
