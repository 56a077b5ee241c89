#![doc = include_str!("../README.md")]

pub mod db;
pub mod env;
pub mod error;
pub mod options;
pub mod utils;

// Re-exports for convenience
pub use db::adapter::{Adapter, TransactionAdapter};
pub use db::models::{
    AdminPermission, Download, DownloadStatus, Order, OrderItem, OrderStatus, OtpCode,
    Permissions, PermissionsPatch, Product, Role, User,
};
pub use db::schema::Schema;
pub use error::{ApiError, EduStoreError, ErrorCode, HttpStatus};
pub use options::EduStoreOptions;
