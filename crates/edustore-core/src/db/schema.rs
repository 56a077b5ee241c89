// Schema DSL describing the EduStore tables.
//
// Backends read it to create tables (sqlx) or to enforce unique fields (memory).
// Fields are kept in declaration order so generated DDL is stable.

use serde::{Deserialize, Serialize};

/// Field types supported by the schema system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    /// Floating point (money).
    Number,
    Integer,
    Boolean,
    /// Unix epoch milliseconds.
    Timestamp,
    /// Arbitrary JSON, stored as text by SQL backends.
    Json,
}

/// A single column definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<FieldReference>,
}

impl SchemaField {
    fn of(field_type: FieldType, required: bool) -> Self {
        Self {
            field_type,
            required,
            unique: false,
            references: None,
        }
    }

    pub fn required_string() -> Self {
        Self::of(FieldType::String, true)
    }

    pub fn optional_string() -> Self {
        Self::of(FieldType::String, false)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number, true)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer, true)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean, true)
    }

    pub fn timestamp() -> Self {
        Self::of(FieldType::Timestamp, true)
    }

    pub fn optional_timestamp() -> Self {
        Self::of(FieldType::Timestamp, false)
    }

    pub fn json() -> Self {
        Self::of(FieldType::Json, true)
    }

    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_reference(mut self, table: &str, field: &str) -> Self {
        self.references = Some(FieldReference {
            table: table.to_string(),
            field: field.to_string(),
            on_delete: None,
        });
        self
    }

    /// Like [`with_reference`](Self::with_reference) but rows are removed
    /// together with the referenced row.
    pub fn with_cascade(mut self, table: &str, field: &str) -> Self {
        self = self.with_reference(table, field);
        if let Some(fk) = self.references.as_mut() {
            fk.on_delete = Some("CASCADE".into());
        }
        self
    }
}

/// Foreign key reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldReference {
    pub table: String,
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
}

/// A table definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub fields: Vec<(String, SchemaField)>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, schema_field: SchemaField) -> Self {
        self.fields.push((name.to_string(), schema_field));
        self
    }

    pub fn get(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Names of the fields carrying a unique constraint (including `id`).
    pub fn unique_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(name, f)| f.unique || name == "id")
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// The complete database schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// The EduStore schema. Tables are listed parents first so they can be
    /// created in order.
    pub fn edustore() -> Self {
        let user = Table::new("user")
            .field("id", SchemaField::required_string())
            .field("email", SchemaField::optional_string().with_unique())
            .field("phone", SchemaField::optional_string().with_unique())
            .field("firstName", SchemaField::required_string())
            .field("lastName", SchemaField::required_string())
            .field("role", SchemaField::required_string())
            .field("isEmailVerified", SchemaField::boolean())
            .field("isPhoneVerified", SchemaField::boolean())
            .field("createdAt", SchemaField::timestamp())
            .field("updatedAt", SchemaField::timestamp());

        let otp_code = Table::new("otp_code")
            .field("id", SchemaField::required_string())
            .field("email", SchemaField::optional_string())
            .field("phone", SchemaField::optional_string())
            .field("code", SchemaField::required_string())
            .field("expiresAt", SchemaField::timestamp())
            .field("used", SchemaField::boolean())
            .field("createdAt", SchemaField::timestamp());

        let product = Table::new("product")
            .field("id", SchemaField::required_string())
            .field("title", SchemaField::required_string())
            .field("category", SchemaField::required_string())
            .field("price", SchemaField::number())
            .field("filePath", SchemaField::optional_string())
            .field("createdAt", SchemaField::timestamp())
            .field("updatedAt", SchemaField::timestamp());

        let order = Table::new("order")
            .field("id", SchemaField::required_string())
            .field("orderNumber", SchemaField::required_string().with_unique())
            .field(
                "userId",
                SchemaField::required_string().with_reference("user", "id"),
            )
            .field("subtotal", SchemaField::number())
            .field("tax", SchemaField::number())
            .field("total", SchemaField::number())
            .field("status", SchemaField::required_string())
            .field("downloadIds", SchemaField::json())
            .field("completedAt", SchemaField::optional_timestamp())
            .field("createdAt", SchemaField::timestamp())
            .field("updatedAt", SchemaField::timestamp());

        let order_item = Table::new("order_item")
            .field("id", SchemaField::required_string())
            .field(
                "orderId",
                SchemaField::required_string().with_cascade("order", "id"),
            )
            .field("productId", SchemaField::required_string())
            .field("title", SchemaField::required_string())
            .field("category", SchemaField::required_string())
            .field("price", SchemaField::number())
            .field("quantity", SchemaField::integer())
            .field("createdAt", SchemaField::timestamp());

        let download = Table::new("download")
            .field("id", SchemaField::required_string())
            .field("downloadId", SchemaField::required_string().with_unique())
            .field(
                "orderId",
                SchemaField::required_string().with_cascade("order", "id"),
            )
            .field("productId", SchemaField::required_string())
            .field(
                "userId",
                SchemaField::required_string().with_reference("user", "id"),
            )
            .field("status", SchemaField::required_string())
            .field("expiresAt", SchemaField::timestamp())
            .field("createdAt", SchemaField::timestamp());

        let admin_permission = Table::new("admin_permission")
            .field("id", SchemaField::required_string())
            .field(
                "userId",
                SchemaField::required_string()
                    .with_unique()
                    .with_cascade("user", "id"),
            )
            .field("canManageProducts", SchemaField::boolean())
            .field("canManageCategories", SchemaField::boolean())
            .field("canManageOrders", SchemaField::boolean())
            .field("canManageExams", SchemaField::boolean())
            .field("canViewAnalytics", SchemaField::boolean())
            .field("createdAt", SchemaField::timestamp())
            .field("updatedAt", SchemaField::timestamp());

        Self::new()
            .table(user)
            .table(otp_code)
            .table(product)
            .table(order)
            .table(order_item)
            .table(download)
            .table(admin_permission)
    }
}
