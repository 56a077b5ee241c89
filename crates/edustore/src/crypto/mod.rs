// Crypto module: session token signing and one-time code generation.

pub mod jwt;
pub mod random;

pub use jwt::{sign_jwt, verify_jwt};
pub use random::{constant_time_equal, generate_otp};
