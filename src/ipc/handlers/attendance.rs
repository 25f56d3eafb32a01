use crate::error::{CoreError, CoreResult};
use crate::ipc::error::{fail, no_workspace, ok};
use crate::ipc::params;
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceStatus;
use crate::store::{self, SaveSession, SessionEntry};
use rusqlite::Connection;
use serde_json::json;

fn parse_entries(p: &serde_json::Value) -> CoreResult<Vec<SessionEntry>> {
    let Some(items) = p.get("attendances").and_then(|v| v.as_array()) else {
        return Err(CoreError::bad_params("missing attendances"));
    };
    let mut entries = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let student_id = params::required_str(item, "studentId")
            .map_err(|e| e.with_details(json!({ "index": i })))?;
        let raw_status = params::required_str(item, "status")
            .map_err(|e| e.with_details(json!({ "index": i })))?;
        let status = AttendanceStatus::parse(&raw_status).ok_or_else(|| {
            CoreError::bad_params("status must be one of: present, absent")
                .with_details(json!({ "index": i, "status": raw_status }))
        })?;
        entries.push(SessionEntry {
            student_id,
            status,
            brought_bible: params::optional_bool(item, "bible")?,
            brought_magazine: params::optional_bool(item, "magazine")?,
        });
    }
    Ok(entries)
}

fn attendance_save_session(
    conn: &Connection,
    p: &serde_json::Value,
) -> CoreResult<serde_json::Value> {
    let input = SaveSession {
        class_group_id: params::required_str(p, "classGroupId")?,
        date: params::required_date(p, "date")?,
        offering: params::offering_patch(p)?,
        visitors: params::visitors_patch(p)?,
        entries: parse_entries(p)?,
    };
    let outcome = store::save_session(conn, &input)?;
    Ok(json!({
        "count": outcome.saved,
        "session": outcome.session
    }))
}

fn attendance_session_open(
    conn: &Connection,
    p: &serde_json::Value,
) -> CoreResult<serde_json::Value> {
    let class_group_id = params::required_str(p, "classGroupId")?;
    let date = params::required_date(p, "date")?;
    let roster = store::session_open(conn, &class_group_id, date)?;
    Ok(json!(roster))
}

fn attendance_delete(conn: &Connection, p: &serde_json::Value) -> CoreResult<serde_json::Value> {
    let id = p
        .get("attendanceId")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| CoreError::bad_params("missing attendanceId"))?;
    store::delete_attendance(conn, id)?;
    Ok(json!({ "ok": true }))
}

fn handle_attendance_save_session(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match attendance_save_session(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

fn handle_attendance_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match attendance_session_open(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

fn handle_attendance_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match attendance_delete(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.saveSession" => Some(handle_attendance_save_session(state, req)),
        "attendance.sessionOpen" => Some(handle_attendance_session_open(state, req)),
        "attendance.delete" => Some(handle_attendance_delete(state, req)),
        _ => None,
    }
}
