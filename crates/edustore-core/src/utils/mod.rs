// Utility functions: identifier generation and clock helpers.

pub mod id;
pub mod time;

pub use id::{generate_id, generate_reference};
pub use time::now_millis;
