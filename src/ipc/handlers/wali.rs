use crate::ipc::error::ok;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    current_user, get_optional_str, get_required_str, managed_student, require_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::phone::{normalize_phone, render_message, whatsapp_link};
use rusqlite::Connection;
use serde_json::{json, Value};

fn whatsapp_link_for(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user = current_user(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let student = managed_student(conn, &user, &student_id)?;

    let cc = setup::country_code(conn).map_err(HandlerErr::db_query)?;
    let phone = normalize_phone(student.guardian_phone.as_deref().unwrap_or(""), &cc);
    if phone.is_empty() {
        return Err(HandlerErr::new("no_phone", "student has no guardian phone")
            .with_details(json!({ "studentId": student.id })));
    }

    let template = match get_optional_str(params, "message") {
        Some(m) => m,
        None => setup::message_template(conn).map_err(HandlerErr::db_query)?,
    };
    let message = render_message(
        &template,
        student.guardian_name.as_deref().unwrap_or(""),
        &student.name,
        &student.halaqah_name,
    );
    Ok(json!({
        "phone": phone,
        "message": message,
        "url": whatsapp_link(&phone, &message),
    }))
}

fn handle_whatsapp_link(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| whatsapp_link_for(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "wali.whatsappLink" => Some(handle_whatsapp_link(state, req)),
        _ => None,
    }
}
