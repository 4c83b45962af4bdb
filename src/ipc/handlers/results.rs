use crate::ingest;
use crate::ipc::error::{engine_err, ok};
use crate::ipc::helpers::{db_conn, optional_str, rows_param};
use crate::ipc::types::{AppState, Request};
use crate::normalize;
use serde_json::json;

fn handle_results_preview(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let rows = match rows_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let batch = optional_str(req, "batch");
    let preview = ingest::preview_results(rows, batch.as_deref());
    ok(&req.id, json!(preview))
}

fn handle_results_ingest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let rows = match rows_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let meta = match normalize::parse_metadata(req.params.get("metadata")) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    match ingest::ingest_results(conn, rows, &meta, &state.config) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.preview" => Some(handle_results_preview(state, req)),
        "results.ingest" => Some(handle_results_ingest(state, req)),
        _ => None,
    }
}
