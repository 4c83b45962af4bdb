use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_str, optional_usize};
use crate::ipc::types::{AppState, Request};
use crate::reports::{self, ReportFilters, ToppersScope};
use rusqlite::Connection;
use serde_json::json;

fn report_inputs<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<(&'a Connection, ReportFilters), serde_json::Value> {
    let conn = db_conn(state, req)?;
    let filters =
        reports::parse_filters(req.params.get("filters")).map_err(|e| engine_err(&req.id, &e))?;
    Ok((conn, filters))
}

fn parse_toppers_scope(req: &Request) -> Result<ToppersScope, serde_json::Value> {
    let kind = optional_str(req, "type").unwrap_or_else(|| "Semester".to_string());
    match kind.to_ascii_lowercase().as_str() {
        "semester" => optional_str(req, "semester")
            .map(ToppersScope::Semester)
            .ok_or_else(|| err(&req.id, "bad_params", "missing semester", None)),
        "year" => optional_str(req, "year")
            .map(ToppersScope::Year)
            .ok_or_else(|| err(&req.id, "bad_params", "missing year", None)),
        _ => Err(err(
            &req.id,
            "bad_params",
            "type must be one of: Semester, Year",
            Some(json!({ "type": kind })),
        )),
    }
}

fn handle_backlogs(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (conn, filters) = match report_inputs(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match reports::backlogs(conn, &filters) {
        Ok(rows) => ok(&req.id, json!({ "rows": rows })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_cumulative_backlogs(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (conn, filters) = match report_inputs(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match reports::cumulative_backlogs(conn, &filters) {
        Ok(rows) => ok(&req.id, json!({ "rows": rows })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_cumulative_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (conn, filters) = match report_inputs(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = optional_str(req, "year");
    match reports::cumulative_summary(conn, &filters, year.as_deref()) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_toppers(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (conn, filters) = match report_inputs(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scope = match parse_toppers_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let top_n = match optional_usize(req, "topN") {
        Ok(v) => v.unwrap_or(reports::DEFAULT_TOP_N),
        Err(e) => return e,
    };
    if top_n == 0 {
        return err(&req.id, "bad_params", "topN must be >= 1", None);
    }
    match reports::toppers(conn, &filters, &scope, top_n) {
        Ok(rows) => ok(&req.id, json!({ "rows": rows })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_analytics(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match reports::analytics(conn) {
        Ok(a) => ok(&req.id, json!(a)),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.backlogs" => Some(handle_backlogs(state, req)),
        "reports.cumulativeBacklogs" => Some(handle_cumulative_backlogs(state, req)),
        "reports.cumulativeSummary" => Some(handle_cumulative_summary(state, req)),
        "reports.toppers" => Some(handle_toppers(state, req)),
        "reports.analytics" => Some(handle_analytics(state, req)),
        _ => None,
    }
}
