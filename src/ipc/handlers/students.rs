use crate::error::CoreResult;
use crate::ipc::error::{fail, no_workspace, ok};
use crate::ipc::params;
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

fn students_list(conn: &Connection, p: &serde_json::Value) -> CoreResult<serde_json::Value> {
    let class_group_id = params::required_str(p, "classGroupId")?;
    store::require_class_group(conn, &class_group_id)?;
    let students = store::list_students(conn, &class_group_id)?;
    Ok(json!({
        "classGroupId": class_group_id,
        "total": students.len(),
        "students": students
    }))
}

fn students_create(conn: &Connection, p: &serde_json::Value) -> CoreResult<serde_json::Value> {
    let class_group_id = params::required_str(p, "classGroupId")?;
    let name = params::required_str(p, "name")?;
    let student = store::create_student(conn, &class_group_id, &name)?;
    Ok(json!({ "studentId": student.id, "student": student }))
}

fn students_find(conn: &Connection, p: &serde_json::Value) -> CoreResult<serde_json::Value> {
    let name = params::required_str(p, "name")?;
    let class_group_id = params::optional_str(p, "classGroupId")?;
    let student = store::find_student_by_name(conn, &name, class_group_id.as_deref())?;
    Ok(json!({ "student": student }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match students_list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match students_create(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

fn handle_students_find(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match students_find(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.find" => Some(handle_students_find(state, req)),
        _ => None,
    }
}
