// edustore: the EduStore domain.
//
// Wires together contact validation, crypto, session tokens, the typed store,
// OTP delivery, rate limiting and the route handlers.

pub mod contact;
pub mod context;
pub mod crypto;
pub mod error;
pub mod middleware;
pub mod notify;
pub mod routes;
pub mod session;
pub mod store;

pub use context::AppContext;
pub use error::{ServiceError, ServiceResult};
pub use session::{Claims, TokenKind};
pub use store::{AdapterStore, Store, StoreError};
