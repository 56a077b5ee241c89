// Typed models for every EduStore table.
//
// Field names serialize in camelCase to match the schema; timestamps are
// epoch milliseconds on the wire and in storage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── User ────────────────────────────────────────────────────────

/// Account role. Stored and serialized in upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
    #[serde(rename = "SUPERADMIN")]
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
            Self::SuperAdmin => "SUPERADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "ADMIN" => Ok(Self::Admin),
            "SUPERADMIN" => Ok(Self::SuperAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

// ─── OTP ─────────────────────────────────────────────────────────

/// A one-time passcode issued to exactly one contact address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpCode {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub code: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

// ─── Catalog ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub title: String,
    pub category: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

// ─── Orders ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// COMPLETED and CANCELLED are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Forward-only transition graph:
    /// PENDING → PROCESSING | COMPLETED | CANCELLED, PROCESSING → COMPLETED | CANCELLED.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (_, Self::Completed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid status. Must be one of: {}", Self::ALL.map(|s| s.as_str()).join(", ")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub status: OrderStatus,
    #[serde(default)]
    pub download_ids: Vec<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// A line item. Title, category and price are copied from the catalog at
/// purchase time and never follow later catalog edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub title: String,
    pub category: String,
    pub price: f64,
    pub quantity: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

// ─── Downloads ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DownloadStatus {
    Active,
    Revoked,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Revoked => "REVOKED",
        }
    }
}

/// A download entitlement: the right to fetch one purchased file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Download {
    pub id: String,
    pub download_id: String,
    pub order_id: String,
    pub product_id: String,
    pub user_id: String,
    pub status: DownloadStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

// ─── Admin permissions ───────────────────────────────────────────

/// Capability flags of an admin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_manage_products: bool,
    pub can_manage_categories: bool,
    pub can_manage_orders: bool,
    pub can_manage_exams: bool,
    pub can_view_analytics: bool,
}

impl Permissions {
    pub fn all() -> Self {
        Self {
            can_manage_products: true,
            can_manage_categories: true,
            can_manage_orders: true,
            can_manage_exams: true,
            can_view_analytics: true,
        }
    }

    /// Overwrite the flags present in `patch`, keep the others.
    pub fn apply(&mut self, patch: &PermissionsPatch) {
        let PermissionsPatch {
            can_manage_products,
            can_manage_categories,
            can_manage_orders,
            can_manage_exams,
            can_view_analytics,
        } = *patch;
        if let Some(v) = can_manage_products {
            self.can_manage_products = v;
        }
        if let Some(v) = can_manage_categories {
            self.can_manage_categories = v;
        }
        if let Some(v) = can_manage_orders {
            self.can_manage_orders = v;
        }
        if let Some(v) = can_manage_exams {
            self.can_manage_exams = v;
        }
        if let Some(v) = can_view_analytics {
            self.can_view_analytics = v;
        }
    }
}

/// Partial update of [`Permissions`]. Unknown keys are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PermissionsPatch {
    #[serde(default)]
    pub can_manage_products: Option<bool>,
    #[serde(default)]
    pub can_manage_categories: Option<bool>,
    #[serde(default)]
    pub can_manage_orders: Option<bool>,
    #[serde(default)]
    pub can_manage_exams: Option<bool>,
    #[serde(default)]
    pub can_view_analytics: Option<bool>,
}

/// Stored permission row, one per admin user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPermission {
    pub id: String,
    pub user_id: String,
    pub can_manage_products: bool,
    pub can_manage_categories: bool,
    pub can_manage_orders: bool,
    pub can_manage_exams: bool,
    pub can_view_analytics: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl AdminPermission {
    pub fn permissions(&self) -> Permissions {
        Permissions {
            can_manage_products: self.can_manage_products,
            can_manage_categories: self.can_manage_categories,
            can_manage_orders: self.can_manage_orders,
            can_manage_exams: self.can_manage_exams,
            can_view_analytics: self.can_view_analytics,
        }
    }

    pub fn set_permissions(&mut self, permissions: Permissions) {
        self.can_manage_products = permissions.can_manage_products;
        self.can_manage_categories = permissions.can_manage_categories;
        self.can_manage_orders = permissions.can_manage_orders;
        self.can_manage_exams = permissions.can_manage_exams;
        self.can_view_analytics = permissions.can_view_analytics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_value(Role::SuperAdmin).unwrap(), "SUPERADMIN");
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_status_transitions_are_forward_only() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Completed));
        assert!(Completed.is_terminal());
        assert!(!Processing.is_terminal());
        for terminal in OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal) {
            assert!(OrderStatus::ALL
                .into_iter()
                .all(|next| !terminal.can_transition_to(next)));
        }
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert_eq!("COMPLETED".parse::<OrderStatus>().unwrap(), OrderStatus::Completed);
        let err = "SHIPPED".parse::<OrderStatus>().unwrap_err();
        assert!(err.contains("PENDING, PROCESSING, COMPLETED, CANCELLED"));
    }

    #[test]
    fn test_order_timestamps_are_millis() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let order = Order {
            id: "o1".into(),
            order_number: "ORD-1-ABCDE".into(),
            user_id: "u1".into(),
            subtotal: 20.0,
            tax: 2.0,
            total: 22.0,
            status: OrderStatus::Pending,
            download_ids: vec![],
            completed_at: None,
            created_at: ts,
            updated_at: ts,
        };
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["createdAt"], 1_700_000_000_123i64);
        assert!(json["completedAt"].is_null());
        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn test_permissions_patch_rejects_unknown_keys() {
        let err = serde_json::from_value::<PermissionsPatch>(serde_json::json!({
            "canManageOrders": true,
            "isRoot": true,
        }));
        assert!(err.is_err());

        let patch: PermissionsPatch =
            serde_json::from_value(serde_json::json!({ "canManageOrders": true })).unwrap();
        let mut perms = Permissions::default();
        perms.apply(&patch);
        assert!(perms.can_manage_orders);
        assert!(!perms.can_view_analytics);
    }
}
