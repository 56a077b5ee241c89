// Route handlers.
//
// Each handler takes the shared context, the verified claims where the route
// is authenticated, and the typed request. Transport layers (axum) only
// extract and serialize.

pub mod admin;
pub mod auth;
pub mod downloads;
pub mod ok;
pub mod orders;
