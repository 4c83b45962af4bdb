use crate::directory;
use crate::ipc::error::{engine_err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_clean_subject_names(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match directory::clean_stored_subject_names(conn) {
        Ok(fixed) => ok(&req.id, json!({ "fixed": fixed })),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "maintenance.cleanSubjectNames" => Some(handle_clean_subject_names(state, req)),
        _ => None,
    }
}
