use crate::ipc::error::{fail, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_class_groups_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classGroups": [] }));
    };
    match store::list_class_groups(conn) {
        Ok(groups) => ok(&req.id, json!({ "classGroups": groups })),
        Err(e) => fail(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classGroups.list" => Some(handle_class_groups_list(state, req)),
        _ => None,
    }
}
