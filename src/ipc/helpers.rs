use crate::access::{CurrentUser, StudentScope};
use crate::ipc::error::err;
use crate::ipc::handlers::setup;
use crate::ipc::types::AppState;
use crate::store::{SqliteStore, StudentRow};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn db_query(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn forbidden() -> Self {
        Self::new("forbidden", "current user may not perform this action")
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn require_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_bool(params: &Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key)))
}

pub fn get_required_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key)))
}

pub fn current_user(params: &Value) -> Result<CurrentUser, HandlerErr> {
    CurrentUser::from_params(params).map_err(HandlerErr::bad_params)
}

pub fn require_admin(params: &Value) -> Result<CurrentUser, HandlerErr> {
    let user = current_user(params)?;
    if !user.is_admin() {
        return Err(HandlerErr::forbidden());
    }
    Ok(user)
}

pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn get_optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match get_optional_str(params, key) {
        Some(s) => parse_date(&s, key).map(Some),
        None => Ok(None),
    }
}

/// Inclusive `from`/`to` filter, as `YYYY-MM-DD` bounds that compare as text.
pub fn date_bounds(params: &Value) -> Result<(String, String), HandlerErr> {
    let from = get_optional_date(params, "from")?;
    let to = get_optional_date(params, "to")?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(HandlerErr::bad_params("from must not be after to"));
        }
    }
    Ok((
        from.map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "0000-01-01".to_string()),
        to.map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "9999-12-31".to_string()),
    ))
}

/// Import input: inline `text` wins over `inPath`.
pub fn read_import_text(params: &Value) -> Result<String, HandlerErr> {
    if let Some(text) = params.get("text").and_then(|v| v.as_str()) {
        return Ok(text.to_string());
    }
    let path = get_optional_str(params, "inPath")
        .ok_or_else(|| HandlerErr::bad_params("missing text or inPath"))?;
    std::fs::read_to_string(&path).map_err(|e| {
        HandlerErr::new("bad_file", e.to_string()).with_details(serde_json::json!({ "path": path }))
    })
}

/// Loads a student the caller may write records for (admin, or guru of the
/// student's halaqah).
pub fn managed_student(
    conn: &Connection,
    user: &CurrentUser,
    student_id: &str,
) -> Result<StudentRow, HandlerErr> {
    let student = find_student(conn, student_id)?;
    if !user.can_manage(&student.halaqah_id) {
        return Err(HandlerErr::forbidden());
    }
    Ok(student)
}

/// Loads a student the caller may read (also the student's own wali).
pub fn visible_student(
    conn: &Connection,
    user: &CurrentUser,
    student_id: &str,
) -> Result<StudentRow, HandlerErr> {
    let student = find_student(conn, student_id)?;
    let cc = setup::country_code(conn).map_err(HandlerErr::db_query)?;
    if !user.can_view(&student.halaqah_id, student.guardian_phone.as_deref(), &cc) {
        return Err(HandlerErr::forbidden());
    }
    Ok(student)
}

fn find_student(conn: &Connection, student_id: &str) -> Result<StudentRow, HandlerErr> {
    SqliteStore::new(conn)
        .student(student_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))
}

/// Summary targets: `studentId` (anyone who can see the student) or
/// `halaqahId` (admin or the halaqah's guru).
pub fn summary_targets(
    conn: &Connection,
    user: &CurrentUser,
    params: &Value,
) -> Result<Vec<StudentRow>, HandlerErr> {
    if let Some(student_id) = get_optional_str(params, "studentId") {
        return Ok(vec![visible_student(conn, user, &student_id)?]);
    }
    let Some(halaqah_id) = get_optional_str(params, "halaqahId") else {
        return Err(HandlerErr::bad_params("missing studentId or halaqahId"));
    };
    if !user.can_manage(&halaqah_id) {
        return Err(HandlerErr::forbidden());
    }
    let cc = setup::country_code(conn).map_err(HandlerErr::db_query)?;
    SqliteStore::new(conn)
        .list_students(&StudentScope::All, Some(&halaqah_id), &cc)
        .map_err(HandlerErr::db_query)
}
