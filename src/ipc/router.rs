use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");

    let families: [fn(&mut AppState, &Request) -> Option<serde_json::Value>; 9] = [
        handlers::core::try_handle,
        handlers::setup::try_handle,
        handlers::halaqah::try_handle,
        handlers::students::try_handle,
        handlers::import::try_handle,
        handlers::setoran::try_handle,
        handlers::assessments::try_handle,
        handlers::announcements::try_handle,
        handlers::wali::try_handle,
    ];
    for try_handle in families {
        if let Some(resp) = try_handle(state, &req) {
            return resp;
        }
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
