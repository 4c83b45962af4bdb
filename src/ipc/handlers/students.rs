use crate::db;
use crate::directory;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_str, optional_usize, rows_param};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use serde_json::json;

const DEFAULT_PAGE_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 500;

fn handle_students_sync(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let rows = match rows_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match directory::sync_students(conn, rows) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_students_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let page = match optional_usize(req, "page") {
        Ok(v) => v.unwrap_or(1),
        Err(e) => return e,
    };
    let limit = match optional_usize(req, "limit") {
        Ok(v) => v.unwrap_or(DEFAULT_PAGE_LIMIT),
        Err(e) => return e,
    };
    if page == 0 {
        return err(&req.id, "bad_params", "page must be >= 1", None);
    }
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return err(
            &req.id,
            "bad_params",
            format!("limit must be between 1 and {}", MAX_PAGE_LIMIT),
            Some(json!({ "limit": limit })),
        );
    }
    let offset = match (page - 1)
        .checked_mul(limit)
        .and_then(|o| i64::try_from(o).ok())
    {
        Some(o) => o,
        None => {
            return err(
                &req.id,
                "bad_params",
                "page is out of range",
                Some(json!({ "page": page, "limit": limit })),
            )
        }
    };
    let query = optional_str(req, "query");

    match db::search_students(conn, query.as_deref(), limit as i64, offset) {
        Ok((data, total)) => {
            let total_pages = ((total.max(0) as usize) + limit - 1) / limit;
            ok(
                &req.id,
                json!({
                    "data": data,
                    "total": total,
                    "page": page,
                    "totalPages": total_pages.max(1),
                }),
            )
        }
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(key) = optional_str(req, "id").or_else(|| optional_str(req, "rollNumber")) else {
        return err(&req.id, "bad_params", "missing id or rollNumber", None);
    };
    let cgpa_upto = optional_str(req, "cgpaUpto");

    match reports::student_details(conn, &key, cgpa_upto.as_deref()) {
        Ok(details) => ok(&req.id, json!(details)),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.sync" => Some(handle_students_sync(state, req)),
        "students.search" => Some(handle_students_search(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        _ => None,
    }
}
