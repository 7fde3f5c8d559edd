use crate::import::{self, GroupRepository, ImportError, RowStatus};
use crate::ipc::error::ok;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{get_optional_str, read_import_text, require_admin, require_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster_csv::{self, TEMPLATE_CSV, TEMPLATE_FILE_NAME};
use crate::store::SqliteStore;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;

impl From<ImportError> for HandlerErr {
    fn from(e: ImportError) -> Self {
        HandlerErr::new(e.code(), format!("{e:#}"))
    }
}

fn import_template(params: &Value) -> Result<Value, HandlerErr> {
    let mut out = json!({
        "fileName": TEMPLATE_FILE_NAME,
        "content": TEMPLATE_CSV,
    });
    if let Some(out_path) = get_optional_str(params, "outPath") {
        let path = PathBuf::from(&out_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    HandlerErr::new("io_failed", e.to_string())
                        .with_details(json!({ "path": out_path }))
                })?;
            }
        }
        std::fs::write(&path, TEMPLATE_CSV).map_err(|e| {
            HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
        })?;
        out["path"] = json!(out_path);
    }
    Ok(out)
}

fn import_preview(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_admin(params)?;
    let text = read_import_text(params)?;
    let settings = setup::import_settings(conn).map_err(HandlerErr::db_query)?;

    let (columns, rows) = import::read_file(&text)?;
    let store = SqliteStore::new(conn);
    let statuses = import::preview_statuses(&store, &rows, &settings)?;

    let existing = store
        .list_group_names()
        .map_err(HandlerErr::db_query)?
        .into_iter()
        .collect::<HashSet<_>>();
    let groups_to_create = import::referenced_groups(&rows)
        .into_iter()
        .filter(|g| !existing.contains(g))
        .collect::<Vec<_>>();

    let count = |s: RowStatus| statuses.iter().filter(|x| **x == s).count();
    let preview_rows = rows
        .iter()
        .zip(&statuses)
        .map(|(row, status)| {
            let mut v = json!(row);
            v["status"] = json!(status);
            v
        })
        .collect::<Vec<_>>();

    let delimiter = roster_csv::detect_delimiter(&text) as char;
    Ok(json!({
        "delimiter": delimiter.to_string(),
        "columns": columns,
        "rowsTotal": rows.len(),
        "newCount": count(RowStatus::New),
        "duplicateCount": count(RowStatus::Duplicate),
        "invalidCount": count(RowStatus::Invalid),
        "groupsToCreate": groups_to_create,
        "rows": preview_rows,
    }))
}

fn import_apply(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_admin(params)?;
    let text = read_import_text(params)?;
    let settings = setup::import_settings(conn).map_err(HandlerErr::db_query)?;
    let mut store = SqliteStore::new(conn);
    let report = import::run_import(&mut store, &text, &settings)?;
    Ok(json!(report))
}

fn handle_import_template(_state: &mut AppState, req: &Request) -> Value {
    match import_template(&req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_import_preview(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| import_preview(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_import_apply(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| import_apply(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.importTemplate" => Some(handle_import_template(state, req)),
        "students.importPreview" => Some(handle_import_preview(state, req)),
        "students.importApply" => Some(handle_import_apply(state, req)),
        _ => None,
    }
}
