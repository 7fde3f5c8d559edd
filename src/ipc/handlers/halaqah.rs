use crate::access::StudentScope;
use crate::ipc::error::ok;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    current_user, get_optional_str, get_required_str, require_admin, require_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::collections::HashSet;

fn halaqah_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user = current_user(params)?;
    let store = SqliteStore::new(conn);
    let all = store.list_halaqah().map_err(HandlerErr::db_query)?;

    let cc = setup::country_code(conn).map_err(HandlerErr::db_query)?;

    let visible: Vec<_> = match user.student_scope(&cc) {
        StudentScope::All => all,
        StudentScope::Halaqah(ids) => all.into_iter().filter(|h| ids.contains(&h.id)).collect(),
        scope @ StudentScope::GuardianPhone(_) => {
            // Wali see the halaqah their own children sit in.
            let mine = store
                .list_students(&scope, None, &cc)
                .map_err(HandlerErr::db_query)?
                .into_iter()
                .map(|s| s.halaqah_id)
                .collect::<HashSet<_>>();
            all.into_iter().filter(|h| mine.contains(&h.id)).collect()
        }
    };
    Ok(json!({ "halaqah": visible }))
}

fn halaqah_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_admin(params)?;
    let name = get_required_str(params, "name")?;
    let teacher_name = get_optional_str(params, "teacherName");

    let taken: Option<String> = conn
        .query_row("SELECT id FROM halaqah WHERE name = ?", [&name], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::db_query)?;
    if taken.is_some() {
        return Err(HandlerErr::new("duplicate_name", "halaqah name already exists")
            .with_details(json!({ "name": name })));
    }

    let id = SqliteStore::new(conn)
        .create_halaqah(&name, teacher_name.as_deref())
        .map_err(|e| HandlerErr::new("db_insert_failed", format!("{e:#}")))?;
    tracing::info!(halaqah = %name, "halaqah created");
    Ok(json!({ "halaqahId": id }))
}

fn halaqah_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_admin(params)?;
    let halaqah_id = get_required_str(params, "halaqahId")?;
    let Some(row) = SqliteStore::new(conn)
        .halaqah_by_id(&halaqah_id)
        .map_err(HandlerErr::db_query)?
    else {
        return Err(HandlerErr::new("not_found", "halaqah not found"));
    };
    if row.student_count > 0 {
        return Err(
            HandlerErr::new("not_empty", "halaqah still has students")
                .with_details(json!({ "studentCount": row.student_count })),
        );
    }
    conn.execute("DELETE FROM halaqah WHERE id = ?", [&halaqah_id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn handle_halaqah_list(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| halaqah_list(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_halaqah_create(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| halaqah_create(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_halaqah_delete(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| halaqah_delete(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "halaqah.list" => Some(handle_halaqah_list(state, req)),
        "halaqah.create" => Some(handle_halaqah_create(state, req)),
        "halaqah.delete" => Some(handle_halaqah_delete(state, req)),
        _ => None,
    }
}
