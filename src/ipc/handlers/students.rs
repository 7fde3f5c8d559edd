use crate::import::{DuplicateFilter, NewStudent, StudentRepository};
use crate::ipc::error::ok;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    current_user, get_optional_str, get_required_str, require_admin, require_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::phone::normalize_phone;
use crate::store::SqliteStore;
use rusqlite::Connection;
use serde_json::{json, Value};

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user = current_user(params)?;
    let halaqah_id = get_optional_str(params, "halaqahId");
    let cc = setup::country_code(conn).map_err(HandlerErr::db_query)?;
    let rows = SqliteStore::new(conn)
        .list_students(&user.student_scope(&cc), halaqah_id.as_deref(), &cc)
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "students": rows }))
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_admin(params)?;
    let name = get_required_str(params, "name")?;
    let halaqah_id = get_required_str(params, "halaqahId")?;
    let guardian_name = get_optional_str(params, "guardianName");
    let guardian_phone = get_optional_str(params, "guardianPhone");

    let store = SqliteStore::new(conn);
    let Some(halaqah) = store
        .halaqah_by_id(&halaqah_id)
        .map_err(HandlerErr::db_query)?
    else {
        return Err(HandlerErr::new("not_found", "halaqah not found"));
    };

    let cc = setup::country_code(conn).map_err(HandlerErr::db_query)?;
    if let Some(phone) = guardian_phone.as_deref() {
        if normalize_phone(phone, &cc).is_empty() {
            return Err(HandlerErr::bad_params("guardianPhone has no digits"));
        }
        let existing = store.list_guardian_phones().map_err(HandlerErr::db_query)?;
        if DuplicateFilter::new(existing, &cc).is_duplicate(Some(phone)) {
            return Err(HandlerErr::new(
                "duplicate_phone",
                "a student with this guardian phone already exists",
            )
            .with_details(json!({ "guardianPhone": phone })));
        }
    }

    let student = NewStudent {
        name,
        group_name: halaqah.name,
        guardian_name,
        guardian_phone,
    };
    let id = store
        .create_student(&halaqah_id, &student)
        .map_err(|e| HandlerErr::new("db_insert_failed", format!("{e:#}")))?;
    Ok(json!({ "studentId": id }))
}

fn students_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_admin(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let removed = SqliteStore::new(conn)
        .delete_student(&student_id)
        .map_err(|e| HandlerErr::new("db_delete_failed", format!("{e:#}")))?;
    if !removed {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    Ok(json!({ "ok": true }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| students_list(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| students_create(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| students_delete(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
