// Store: typed repository over the raw storage Adapter.
//
// Translates domain operations into CRUD calls on the EduStore tables.
// Multi-row writes (order creation, status changes with entitlement side
// effects, OTP consumption with user upsert, admin deletion) run inside one
// adapter transaction so they either fully apply or not at all.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use edustore_core::db::adapter::{
    Adapter, FindManyQuery, SortBy, TransactionAdapter, WhereClause,
};
use edustore_core::db::models::{
    AdminPermission, Download, DownloadStatus, Order, OrderItem, OrderStatus, OtpCode, Permissions,
    Product, Role, User,
};
use edustore_core::error::EduStoreError;

use crate::contact::Contact;

/// Errors from the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate {model}.{field}")]
    Duplicate { model: String, field: String },

    #[error("{model} is still referenced by {referenced_by}")]
    Referenced { model: String, referenced_by: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<EduStoreError> for StoreError {
    fn from(e: EduStoreError) -> Self {
        match e {
            EduStoreError::UniqueViolation { model, field } => Self::Duplicate { model, field },
            EduStoreError::ForeignKeyViolation {
                model,
                referenced_by,
            } => Self::Referenced {
                model,
                referenced_by,
            },
            EduStoreError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A page of orders and the owner's total order count.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: i64,
}

/// Outcome of [`Store::delete_admin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRemoval {
    Deleted,
    /// No such user.
    Missing,
    /// The account placed orders; order history keeps it alive.
    HasOrders,
}

/// Effect of a status change on an order's entitlements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntitlementEffect {
    None,
    /// Push every entitlement's expiry to the given instant.
    ExtendTo(DateTime<Utc>),
    Revoke,
}

/// The typed repository every service operation goes through.
#[async_trait]
pub trait Store: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────

    async fn create_user(&self, user: &User) -> StoreResult<User>;

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_contact(&self, contact: &Contact) -> StoreResult<Option<User>>;

    async fn set_user_role(&self, id: &str, role: Role, now: DateTime<Utc>) -> StoreResult<Option<User>>;

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>>;

    // ─── OTP ─────────────────────────────────────────────────────

    /// Insert `code` unless the same contact already has an unused,
    /// unexpired code created after `cooldown_since`. Check and insert are
    /// one atomic step. Returns `None` when the cooldown applies.
    async fn issue_otp_if_idle(
        &self,
        code: &OtpCode,
        cooldown_since: DateTime<Utc>,
    ) -> StoreResult<Option<OtpCode>>;

    /// Unused codes for `contact` that have not expired at `now`.
    async fn find_active_otps(&self, contact: &Contact, now: DateTime<Utc>) -> StoreResult<Vec<OtpCode>>;

    /// Mark the code `otp_id` used and find or create the user behind
    /// `contact`, flagging the channel as verified. Returns `None` when the
    /// code was already used or has expired, in which case nothing changes.
    async fn consume_otp(
        &self,
        otp_id: &str,
        contact: &Contact,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<User>>;

    // ─── Catalog ─────────────────────────────────────────────────

    async fn create_product(&self, product: &Product) -> StoreResult<Product>;

    async fn find_product(&self, id: &str) -> StoreResult<Option<Product>>;

    // ─── Orders ──────────────────────────────────────────────────

    /// Persist an order with its items and entitlements, then record the
    /// entitlement identifiers on the order. All or nothing.
    async fn create_order(
        &self,
        order: &Order,
        items: &[OrderItem],
        downloads: &[Download],
    ) -> StoreResult<Order>;

    async fn find_order(&self, id: &str) -> StoreResult<Option<Order>>;

    /// Orders of `user_id`, newest first.
    async fn list_orders_for_user(&self, user_id: &str, limit: u64, offset: u64) -> StoreResult<OrderPage>;

    async fn list_all_orders(&self) -> StoreResult<Vec<Order>>;

    async fn order_items(&self, order_id: &str) -> StoreResult<Vec<OrderItem>>;

    async fn order_downloads(&self, order_id: &str) -> StoreResult<Vec<Download>>;

    /// Move the order from `from` to `to` and apply `effect` to its
    /// entitlements. Returns `None` if the order no longer has status
    /// `from`, so concurrent transitions cannot both succeed.
    async fn transition_order(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        effect: EntitlementEffect,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Order>>;

    async fn find_download(&self, download_id: &str) -> StoreResult<Option<Download>>;

    // ─── Admin permissions ───────────────────────────────────────

    /// Create an ADMIN user together with its permission row.
    async fn create_admin(&self, user: &User, permissions: &AdminPermission) -> StoreResult<User>;

    async fn find_permissions(&self, user_id: &str) -> StoreResult<Option<AdminPermission>>;

    /// Replace the permissions of `user_id`, creating the row if missing.
    async fn upsert_permissions(
        &self,
        user_id: &str,
        permissions: Permissions,
        now: DateTime<Utc>,
    ) -> StoreResult<AdminPermission>;

    /// Delete the permission row and the user, unless the user owns orders.
    async fn delete_admin(&self, user_id: &str) -> StoreResult<AdminRemoval>;
}

// ─── Adapter-backed implementation ──────────────────────────────

/// [`Store`] over any raw [`Adapter`] (memory, sqlx).
#[derive(Debug, Clone)]
pub struct AdapterStore {
    adapter: Arc<dyn Adapter>,
}

impl AdapterStore {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }
}

fn to_row<T: Serialize>(value: &T) -> StoreResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn from_row<T: DeserializeOwned>(row: Value) -> StoreResult<T> {
    Ok(serde_json::from_value(row)?)
}

fn from_rows<T: DeserializeOwned>(rows: Vec<Value>) -> StoreResult<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

fn by_id(id: &str) -> [WhereClause; 1] {
    [WhereClause::eq("id", id)]
}

async fn find_row<T, A>(db: &A, model: &str, where_clauses: &[WhereClause]) -> StoreResult<Option<T>>
where
    T: DeserializeOwned,
    A: Adapter + ?Sized,
{
    db.find_one(model, where_clauses)
        .await?
        .map(from_row)
        .transpose()
}

/// Roll back after a failed step, keeping the step's error.
async fn abort(tx: Box<dyn TransactionAdapter>, err: StoreError) -> StoreError {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!(error = %rollback_err, "rollback failed");
    }
    err
}

/// Run `$body` (an expression over `$tx`) in a transaction on `$adapter`.
macro_rules! transactional {
    ($adapter:expr, |$tx:ident| $body:expr) => {{
        let tx = $adapter.begin_transaction().await?;
        let result = {
            let $tx: &dyn TransactionAdapter = &*tx;
            $body
        };
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(abort(tx, err).await),
        }
    }};
}

async fn consume_otp_in<A: Adapter + ?Sized>(
    db: &A,
    otp_id: &str,
    contact: &Contact,
    now: DateTime<Utc>,
) -> StoreResult<Option<User>> {
    let now_ms = now.timestamp_millis();
    let consumed = db
        .update(
            "otp_code",
            &[
                WhereClause::eq("id", otp_id).and(),
                WhereClause::eq("used", false).and(),
                WhereClause::gt("expiresAt", now_ms),
            ],
            json!({ "used": true }),
        )
        .await?;
    if consumed.is_none() {
        return Ok(None);
    }

    let verified_flag = match contact {
        Contact::Email(_) => "isEmailVerified",
        Contact::Phone(_) => "isPhoneVerified",
    };
    let lookup = [WhereClause::eq(contact.field(), contact.value())];

    if let Some(user) = find_row::<User, _>(db, "user", &lookup).await? {
        let flagged = match contact {
            Contact::Email(_) => user.is_email_verified,
            Contact::Phone(_) => user.is_phone_verified,
        };
        if flagged {
            return Ok(Some(user));
        }
        let updated = db
            .update(
                "user",
                &by_id(&user.id),
                json!({ verified_flag: true, "updatedAt": now_ms }),
            )
            .await?;
        return updated.map(from_row).transpose();
    }

    let user = User {
        id: edustore_core::utils::generate_id(),
        email: contact.as_email().map(str::to_string),
        phone: contact.as_phone().map(str::to_string),
        first_name: String::new(),
        last_name: String::new(),
        role: Role::User,
        is_email_verified: contact.as_email().is_some(),
        is_phone_verified: contact.as_phone().is_some(),
        created_at: now,
        updated_at: now,
    };
    let created = db.create("user", to_row(&user)?).await?;
    Ok(Some(from_row(created)?))
}

async fn create_order_in<A: Adapter + ?Sized>(
    db: &A,
    order: &Order,
    items: &[OrderItem],
    downloads: &[Download],
) -> StoreResult<Order> {
    let mut row = to_row(order)?;
    row["downloadIds"] = json!([]);
    db.create("order", row).await?;

    for item in items {
        db.create("order_item", to_row(item)?).await?;
    }
    for download in downloads {
        db.create("download", to_row(download)?).await?;
    }

    let ids: Vec<&str> = downloads.iter().map(|d| d.download_id.as_str()).collect();
    let updated = db
        .update("order", &by_id(&order.id), json!({ "downloadIds": ids }))
        .await?
        .ok_or_else(|| StoreError::Database(format!("order {} vanished during creation", order.id)))?;
    from_row(updated)
}

async fn transition_order_in<A: Adapter + ?Sized>(
    db: &A,
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
    effect: EntitlementEffect,
    now: DateTime<Utc>,
) -> StoreResult<Option<Order>> {
    let completed_at = if to == OrderStatus::Completed {
        json!(now.timestamp_millis())
    } else {
        Value::Null
    };
    let updated = db
        .update(
            "order",
            &[
                WhereClause::eq("id", order_id).and(),
                WhereClause::eq("status", from.as_str()),
            ],
            json!({
                "status": to.as_str(),
                "completedAt": completed_at,
                "updatedAt": now.timestamp_millis(),
            }),
        )
        .await?;
    let Some(updated) = updated else {
        return Ok(None);
    };

    let of_order = [WhereClause::eq("orderId", order_id)];
    match effect {
        EntitlementEffect::None => {}
        EntitlementEffect::ExtendTo(expires_at) => {
            db.update_many(
                "download",
                &of_order,
                json!({ "expiresAt": expires_at.timestamp_millis() }),
            )
            .await?;
        }
        EntitlementEffect::Revoke => {
            db.update_many(
                "download",
                &of_order,
                json!({ "status": DownloadStatus::Revoked.as_str() }),
            )
            .await?;
        }
    }
    Ok(Some(from_row(updated)?))
}

async fn create_admin_in<A: Adapter + ?Sized>(
    db: &A,
    user: &User,
    permissions: &AdminPermission,
) -> StoreResult<User> {
    let created = db.create("user", to_row(user)?).await?;
    db.create("admin_permission", to_row(permissions)?).await?;
    from_row(created)
}

async fn delete_admin_in<A: Adapter + ?Sized>(db: &A, user_id: &str) -> StoreResult<AdminRemoval> {
    if db.count("user", &by_id(user_id)).await? == 0 {
        return Ok(AdminRemoval::Missing);
    }
    if db.count("order", &[WhereClause::eq("userId", user_id)]).await? > 0 {
        return Ok(AdminRemoval::HasOrders);
    }
    db.delete_many("admin_permission", &[WhereClause::eq("userId", user_id)])
        .await?;
    db.delete("user", &by_id(user_id)).await?;
    Ok(AdminRemoval::Deleted)
}

#[async_trait]
impl Store for AdapterStore {
    async fn create_user(&self, user: &User) -> StoreResult<User> {
        let created = self.adapter.create("user", to_row(user)?).await?;
        from_row(created)
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        find_row(self.adapter.as_ref(), "user", &by_id(id)).await
    }

    async fn find_user_by_contact(&self, contact: &Contact) -> StoreResult<Option<User>> {
        find_row(
            self.adapter.as_ref(),
            "user",
            &[WhereClause::eq(contact.field(), contact.value())],
        )
        .await
    }

    async fn set_user_role(&self, id: &str, role: Role, now: DateTime<Utc>) -> StoreResult<Option<User>> {
        self.adapter
            .update(
                "user",
                &by_id(id),
                json!({ "role": role.as_str(), "updatedAt": now.timestamp_millis() }),
            )
            .await?
            .map(from_row)
            .transpose()
    }

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>> {
        let rows = self
            .adapter
            .find_many(
                "user",
                FindManyQuery::filtered(vec![WhereClause::eq("role", role.as_str())])
                    .sorted(SortBy::asc("createdAt")),
            )
            .await?;
        from_rows(rows)
    }

    async fn issue_otp_if_idle(
        &self,
        code: &OtpCode,
        cooldown_since: DateTime<Utc>,
    ) -> StoreResult<Option<OtpCode>> {
        let (field, value) = match (&code.email, &code.phone) {
            (Some(email), _) => ("email", email.as_str()),
            (None, Some(phone)) => ("phone", phone.as_str()),
            (None, None) => {
                return Err(StoreError::Database("OTP code without a contact".into()));
            }
        };
        let conflict = [
            WhereClause::eq(field, value).and(),
            WhereClause::eq("used", false).and(),
            WhereClause::gt("expiresAt", code.created_at.timestamp_millis()).and(),
            WhereClause::gt("createdAt", cooldown_since.timestamp_millis()),
        ];
        self.adapter
            .create_unless_exists("otp_code", &conflict, to_row(code)?)
            .await?
            .map(from_row)
            .transpose()
    }

    async fn find_active_otps(&self, contact: &Contact, now: DateTime<Utc>) -> StoreResult<Vec<OtpCode>> {
        let rows = self
            .adapter
            .find_many(
                "otp_code",
                FindManyQuery::filtered(vec![
                    WhereClause::eq(contact.field(), contact.value()).and(),
                    WhereClause::eq("used", false).and(),
                    WhereClause::gt("expiresAt", now.timestamp_millis()),
                ])
                .sorted(SortBy::desc("createdAt")),
            )
            .await?;
        from_rows(rows)
    }

    async fn consume_otp(
        &self,
        otp_id: &str,
        contact: &Contact,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        transactional!(self.adapter, |tx| consume_otp_in(tx, otp_id, contact, now).await)
    }

    async fn create_product(&self, product: &Product) -> StoreResult<Product> {
        let created = self.adapter.create("product", to_row(product)?).await?;
        from_row(created)
    }

    async fn find_product(&self, id: &str) -> StoreResult<Option<Product>> {
        find_row(self.adapter.as_ref(), "product", &by_id(id)).await
    }

    async fn create_order(
        &self,
        order: &Order,
        items: &[OrderItem],
        downloads: &[Download],
    ) -> StoreResult<Order> {
        transactional!(self.adapter, |tx| create_order_in(tx, order, items, downloads).await)
    }

    async fn find_order(&self, id: &str) -> StoreResult<Option<Order>> {
        find_row(self.adapter.as_ref(), "order", &by_id(id)).await
    }

    async fn list_orders_for_user(&self, user_id: &str, limit: u64, offset: u64) -> StoreResult<OrderPage> {
        let owner = vec![WhereClause::eq("userId", user_id)];
        let total = self.adapter.count("order", &owner).await?;
        let rows = self
            .adapter
            .find_many(
                "order",
                FindManyQuery::filtered(owner)
                    .sorted(SortBy::desc("createdAt"))
                    .paged(
                        i64::try_from(limit).unwrap_or(i64::MAX),
                        i64::try_from(offset).unwrap_or(i64::MAX),
                    ),
            )
            .await?;
        Ok(OrderPage {
            orders: from_rows(rows)?,
            total,
        })
    }

    async fn list_all_orders(&self) -> StoreResult<Vec<Order>> {
        let rows = self
            .adapter
            .find_many("order", FindManyQuery::default().sorted(SortBy::asc("createdAt")))
            .await?;
        from_rows(rows)
    }

    async fn order_items(&self, order_id: &str) -> StoreResult<Vec<OrderItem>> {
        let rows = self
            .adapter
            .find_many(
                "order_item",
                FindManyQuery::filtered(vec![WhereClause::eq("orderId", order_id)])
                    .sorted(SortBy::asc("createdAt")),
            )
            .await?;
        from_rows(rows)
    }

    async fn order_downloads(&self, order_id: &str) -> StoreResult<Vec<Download>> {
        let rows = self
            .adapter
            .find_many(
                "download",
                FindManyQuery::filtered(vec![WhereClause::eq("orderId", order_id)])
                    .sorted(SortBy::asc("createdAt")),
            )
            .await?;
        from_rows(rows)
    }

    async fn transition_order(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        effect: EntitlementEffect,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Order>> {
        transactional!(self.adapter, |tx| {
            transition_order_in(tx, order_id, from, to, effect, now).await
        })
    }

    async fn find_download(&self, download_id: &str) -> StoreResult<Option<Download>> {
        find_row(
            self.adapter.as_ref(),
            "download",
            &[WhereClause::eq("downloadId", download_id)],
        )
        .await
    }

    async fn create_admin(&self, user: &User, permissions: &AdminPermission) -> StoreResult<User> {
        transactional!(self.adapter, |tx| create_admin_in(tx, user, permissions).await)
    }

    async fn find_permissions(&self, user_id: &str) -> StoreResult<Option<AdminPermission>> {
        find_row(
            self.adapter.as_ref(),
            "admin_permission",
            &[WhereClause::eq("userId", user_id)],
        )
        .await
    }

    async fn upsert_permissions(
        &self,
        user_id: &str,
        permissions: Permissions,
        now: DateTime<Utc>,
    ) -> StoreResult<AdminPermission> {
        let of_user = [WhereClause::eq("userId", user_id)];
        let mut patch = to_row(&permissions)?;
        patch["updatedAt"] = json!(now.timestamp_millis());
        if let Some(row) = self.adapter.update("admin_permission", &of_user, patch).await? {
            return from_row(row);
        }

        let mut record = AdminPermission {
            id: edustore_core::utils::generate_id(),
            user_id: user_id.to_string(),
            can_manage_products: false,
            can_manage_categories: false,
            can_manage_orders: false,
            can_manage_exams: false,
            can_view_analytics: false,
            created_at: now,
            updated_at: now,
        };
        record.set_permissions(permissions);
        let created = self.adapter.create("admin_permission", to_row(&record)?).await?;
        from_row(created)
    }

    async fn delete_admin(&self, user_id: &str) -> StoreResult<AdminRemoval> {
        transactional!(self.adapter, |tx| delete_admin_in(tx, user_id).await)
    }
}
