pub mod adapter;
pub mod models;
pub mod schema;

pub use adapter::{Adapter, TransactionAdapter};
pub use models::{
    AdminPermission, Download, DownloadStatus, Order, OrderItem, OrderStatus, OtpCode,
    Permissions, PermissionsPatch, Product, Role, User,
};
pub use schema::{FieldType, Schema, SchemaField, Table};
