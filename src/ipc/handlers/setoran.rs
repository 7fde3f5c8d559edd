use crate::calc::{self, SetoranEntry};
use crate::ipc::error::ok;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    current_user, date_bounds, get_optional_str, get_required_i64, get_required_str,
    managed_student, parse_date, require_conn, summary_targets, visible_student, HandlerErr,
    DATE_FORMAT,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

/// Al-Baqarah, the longest surah, has 286 ayat.
const MAX_AYAT: i64 = 286;
const MAX_MISTAKES: i64 = 999;

fn setoran_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user = current_user(params)?;
    let student_id = get_required_str(params, "studentId")?;
    managed_student(conn, &user, &student_id)?;

    let date = parse_date(&get_required_str(params, "date")?, "date")?;
    let surah = get_required_str(params, "surah")?;
    let ayat_from = get_required_i64(params, "ayatFrom")?;
    let ayat_to = get_required_i64(params, "ayatTo")?;
    let mistakes = get_required_i64(params, "mistakes")?;
    let score = params
        .get("score")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params("score must be a number"))?;
    let note = get_optional_str(params, "note");

    if ayat_from < 1 {
        return Err(HandlerErr::bad_params("ayatFrom must be >= 1"));
    }
    if ayat_to < ayat_from {
        return Err(HandlerErr::bad_params("ayatTo must be >= ayatFrom"));
    }
    if ayat_to > MAX_AYAT {
        return Err(HandlerErr::bad_params(format!("ayatTo must be <= {}", MAX_AYAT)));
    }
    if !(0..=MAX_MISTAKES).contains(&mistakes) {
        return Err(HandlerErr::bad_params(format!(
            "mistakes must be in 0..={}",
            MAX_MISTAKES
        )));
    }
    if !(0.0..=100.0).contains(&score) {
        return Err(HandlerErr::bad_params("score must be in 0..=100"));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO setoran(id, student_id, date, surah, ayat_from, ayat_to, mistakes, score, note, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &id,
            &student_id,
            date.format(DATE_FORMAT).to_string(),
            &surah,
            ayat_from,
            ayat_to,
            mistakes,
            score,
            note.as_deref(),
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    Ok(json!({ "setoranId": id }))
}

fn setoran_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user = current_user(params)?;
    let student_id = get_required_str(params, "studentId")?;
    visible_student(conn, &user, &student_id)?;
    let (from, to) = date_bounds(params)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, date, surah, ayat_from, ayat_to, mistakes, score, note
             FROM setoran
             WHERE student_id = ? AND date >= ? AND date <= ?
             ORDER BY date DESC, created_at DESC",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map((&student_id, &from, &to), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "date": r.get::<_, String>(1)?,
                "surah": r.get::<_, String>(2)?,
                "ayatFrom": r.get::<_, i64>(3)?,
                "ayatTo": r.get::<_, i64>(4)?,
                "mistakes": r.get::<_, i64>(5)?,
                "score": r.get::<_, f64>(6)?,
                "note": r.get::<_, Option<String>>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "setoran": rows }))
}

fn load_entries(
    conn: &Connection,
    student_id: &str,
    from: &str,
    to: &str,
) -> Result<Vec<SetoranEntry>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT ayat_from, ayat_to, mistakes, score
             FROM setoran
             WHERE student_id = ? AND date >= ? AND date <= ?",
        )
        .map_err(HandlerErr::db_query)?;
    let entries = stmt
        .query_map((student_id, from, to), |r| {
            Ok(SetoranEntry {
                ayat_from: r.get(0)?,
                ayat_to: r.get(1)?,
                mistakes: r.get(2)?,
                score: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(entries)
}

fn setoran_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user = current_user(params)?;
    let targets = summary_targets(conn, &user, params)?;
    let (from, to) = date_bounds(params)?;
    let thresholds = setup::tier_thresholds(conn).map_err(HandlerErr::db_query)?;

    let mut students = Vec::with_capacity(targets.len());
    for student in targets {
        let entries = load_entries(conn, &student.id, &from, &to)?;
        students.push(json!({
            "studentId": student.id,
            "name": student.name,
            "halaqahId": student.halaqah_id,
            "summary": calc::summarize_setoran(&entries, &thresholds),
        }));
    }
    Ok(json!({ "students": students }))
}

fn handle_setoran_create(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| setoran_create(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_setoran_list(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| setoran_list(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_setoran_summary(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| setoran_summary(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setoran.create" => Some(handle_setoran_create(state, req)),
        "setoran.list" => Some(handle_setoran_list(state, req)),
        "setoran.summary" => Some(handle_setoran_summary(state, req)),
        _ => None,
    }
}
