use crate::error::{CoreError, CoreResult};
use crate::history;
use crate::ipc::error::{fail, no_workspace, ok};
use crate::ipc::params;
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

fn history_student(conn: &Connection, p: &serde_json::Value) -> CoreResult<serde_json::Value> {
    let query = params::history_query(conn, p)?;
    let reference_date = params::reference_date(p)?;

    let student_id = match params::optional_str(p, "studentId")? {
        Some(id) => id,
        None => {
            let Some(name) = params::optional_str(p, "studentName")? else {
                return Err(CoreError::bad_params("studentId or studentName is required"));
            };
            let class_group_id = params::optional_str(p, "classGroupId")?;
            store::find_student_by_name(conn, &name, class_group_id.as_deref())?.id
        }
    };

    let h = history::build_history(conn, &student_id, &query, reference_date)?;
    Ok(json!(h))
}

fn history_class(conn: &Connection, p: &serde_json::Value) -> CoreResult<serde_json::Value> {
    let caller = params::caller(p)?;
    let class_group_id = params::required_str(p, "classGroupId")?;
    let query = params::history_query(conn, p)?;
    let reference_date = params::reference_date(p)?;

    let rows = history::build_class_history(conn, &class_group_id, &query, reference_date, caller)?;
    Ok(json!({
        "classGroupId": class_group_id,
        "total": rows.len(),
        "students": rows
    }))
}

fn handle_history_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match history_student(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

fn handle_history_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match history_class(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "history.student" => Some(handle_history_student(state, req)),
        "history.class" => Some(handle_history_class(state, req)),
        _ => None,
    }
}
