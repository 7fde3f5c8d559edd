use crate::calc::{self, DailyCheck};
use crate::ipc::error::ok;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    current_user, date_bounds, get_required_bool, get_required_str, managed_student, parse_date,
    require_conn, summary_targets, HandlerErr, DATE_FORMAT,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn assessments_record(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user = current_user(params)?;
    let student_id = get_required_str(params, "studentId")?;
    managed_student(conn, &user, &student_id)?;
    let date = parse_date(&get_required_str(params, "date")?, "date")?
        .format(DATE_FORMAT)
        .to_string();
    let check = DailyCheck {
        present: get_required_bool(params, "present")?,
        on_time: get_required_bool(params, "onTime")?,
        prayer: get_required_bool(params, "prayer")?,
        manners: get_required_bool(params, "manners")?,
    };

    conn.execute(
        "INSERT INTO daily_assessments(student_id, date, present, on_time, prayer, manners, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
         ON CONFLICT(student_id, date) DO UPDATE SET
           present = excluded.present,
           on_time = excluded.on_time,
           prayer = excluded.prayer,
           manners = excluded.manners,
           updated_at = excluded.updated_at",
        (
            &student_id,
            &date,
            check.present,
            check.on_time,
            check.prayer,
            check.manners,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "ok": true, "studentId": student_id, "date": date }))
}

fn load_days(
    conn: &Connection,
    student_id: &str,
    from: &str,
    to: &str,
) -> Result<Vec<DailyCheck>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT present, on_time, prayer, manners
             FROM daily_assessments
             WHERE student_id = ? AND date >= ? AND date <= ?",
        )
        .map_err(HandlerErr::db_query)?;
    let days = stmt
        .query_map((student_id, from, to), |r| {
            Ok(DailyCheck {
                present: r.get(0)?,
                on_time: r.get(1)?,
                prayer: r.get(2)?,
                manners: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(days)
}

fn assessments_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user = current_user(params)?;
    let targets = summary_targets(conn, &user, params)?;
    let (from, to) = date_bounds(params)?;
    let minimum = setup::attendance_minimum(conn).map_err(HandlerErr::db_query)?;

    let mut students = Vec::with_capacity(targets.len());
    for student in targets {
        let days = load_days(conn, &student.id, &from, &to)?;
        students.push(json!({
            "studentId": student.id,
            "name": student.name,
            "halaqahId": student.halaqah_id,
            "summary": calc::summarize_days(&days, minimum),
        }));
    }
    Ok(json!({ "students": students }))
}

fn handle_assessments_record(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| assessments_record(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_assessments_summary(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| assessments_summary(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "assessments.record" => Some(handle_assessments_record(state, req)),
        "assessments.summary" => Some(handle_assessments_summary(state, req)),
        _ => None,
    }
}
