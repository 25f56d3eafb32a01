use crate::error::{CoreError, CoreResult};
use crate::ipc::error::{fail, no_workspace, ok};
use crate::ipc::params;
use crate::ipc::types::{AppState, Request};
use crate::period;
use crate::report;
use rusqlite::Connection;
use serde_json::json;

/// `all` (or the older `todas`) and a missing value both mean every class group.
fn class_filter(p: &serde_json::Value) -> CoreResult<Option<String>> {
    Ok(params::optional_str(p, "classGroupId")?
        .filter(|c| !matches!(c.to_ascii_lowercase().as_str(), "all" | "todas")))
}

fn reports_period_report(
    conn: &Connection,
    p: &serde_json::Value,
) -> CoreResult<serde_json::Value> {
    let caller = params::caller(p)?;
    let period_type =
        params::period_type(p)?.ok_or_else(|| CoreError::bad_params("missing periodType"))?;
    let year = params::year(conn, p)?;
    let class_group_id = class_filter(p)?;

    let model =
        report::build_period_report(conn, year, period_type, class_group_id.as_deref(), caller)?;
    Ok(json!(model))
}

fn periods_partition(conn: &Connection, p: &serde_json::Value) -> CoreResult<serde_json::Value> {
    let period_type =
        params::period_type(p)?.ok_or_else(|| CoreError::bad_params("missing periodType"))?;
    let year = params::year(conn, p)?;
    let periods = period::partition(year, period_type)?;
    Ok(json!({
        "periodType": period_type,
        "year": year,
        "periods": periods
    }))
}

fn handle_reports_period_report(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match reports_period_report(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

fn handle_periods_partition(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match periods_partition(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => fail(&req.id, error),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.periodReport" => Some(handle_reports_period_report(state, req)),
        "periods.partition" => Some(handle_periods_partition(state, req)),
        _ => None,
    }
}
