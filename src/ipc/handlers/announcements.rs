use crate::access::Role;
use crate::ipc::error::ok;
use crate::ipc::helpers::{current_user, get_required_str, require_admin, require_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

const AUDIENCES: [&str; 3] = ["all", "guru", "wali"];

fn announcements_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_admin(params)?;
    let title = get_required_str(params, "title")?;
    let body = get_required_str(params, "body")?;
    let audience = get_required_str(params, "audience")?;
    if !AUDIENCES.contains(&audience.as_str()) {
        return Err(HandlerErr::bad_params("audience must be one of all, guru, wali"));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO announcements(id, title, body, audience, created_at)
         VALUES(?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
        (&id, &title, &body, &audience),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    Ok(json!({ "announcementId": id }))
}

fn announcements_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user = current_user(params)?;
    let own = match user.role {
        Role::Guru => Some("guru"),
        Role::Wali => Some("wali"),
        Role::SuperAdmin | Role::Admin => None,
    };

    let mut stmt = conn
        .prepare(
            "SELECT id, title, body, audience, created_at
             FROM announcements
             WHERE ?1 IS NULL OR audience = 'all' OR audience = ?1
             ORDER BY created_at DESC, rowid DESC",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map([own], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "body": r.get::<_, String>(2)?,
                "audience": r.get::<_, String>(3)?,
                "createdAt": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "announcements": rows }))
}

fn announcements_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_admin(params)?;
    let id = get_required_str(params, "announcementId")?;
    let n = conn
        .execute("DELETE FROM announcements WHERE id = ?", [&id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if n == 0 {
        return Err(HandlerErr::new("not_found", "announcement not found"));
    }
    Ok(json!({ "ok": true }))
}

fn handle_announcements_create(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| announcements_create(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_announcements_list(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| announcements_list(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_announcements_delete(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| announcements_delete(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "announcements.create" => Some(handle_announcements_create(state, req)),
        "announcements.list" => Some(handle_announcements_list(state, req)),
        "announcements.delete" => Some(handle_announcements_delete(state, req)),
        _ => None,
    }
}
