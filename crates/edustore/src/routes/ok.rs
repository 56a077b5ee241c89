// Health check.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub fn handle_ok() -> OkResponse {
    OkResponse { ok: true }
}
