use crate::error::{CoreError, CoreResult};
use crate::history::HistoryQuery;
use crate::ipc::handlers::setup;
use crate::model::{self, Money, MAX_VISITORS};
use crate::period::PeriodType;
use crate::policy::{Caller, Role};
use crate::store::MetaPatch;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

pub fn required_str(params: &Value, key: &str) -> CoreResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &Value, key: &str) -> CoreResult<Option<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(CoreError::bad_params(format!("{} must be a string", key))),
    }
}

pub fn required_date(params: &Value, key: &str) -> CoreResult<NaiveDate> {
    model::parse_date(&required_str(params, key)?, key)
}

/// Year within the workspace's configured bounds.
pub fn year(conn: &Connection, params: &Value) -> CoreResult<i32> {
    let y = params
        .get("year")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| CoreError::bad_params("missing year"))?;
    let (min, max) = setup::year_bounds(conn);
    if !(min..=max).contains(&y) {
        return Err(CoreError::bad_params(format!("year must be in {}..={}", min, max))
            .with_details(serde_json::json!({ "year": y })));
    }
    Ok(y as i32)
}

pub fn month(params: &Value) -> CoreResult<Option<u32>> {
    match params.get("month") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(m) if (1..=12).contains(&m) => Ok(Some(m as u32)),
            _ => Err(CoreError::bad_params("month must be an integer between 1 and 12")),
        },
    }
}

pub fn period_type(params: &Value) -> CoreResult<Option<PeriodType>> {
    match params.get("periodType") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => PeriodType::parse(s).map(Some),
        Some(other) => Err(CoreError::invalid_period_type(&other.to_string())),
    }
}

pub fn history_query(conn: &Connection, params: &Value) -> CoreResult<HistoryQuery> {
    let period_type = match period_type(params)? {
        Some(t) => t,
        None => setup::default_period_type(conn),
    };
    Ok(HistoryQuery {
        period_type,
        year: year(conn, params)?,
        month: month(params)?,
    })
}

/// Missing role means the least-privileged caller.
pub fn caller(params: &Value) -> CoreResult<Caller> {
    match optional_str(params, "role")? {
        None => Ok(Caller::student()),
        Some(raw) => Role::parse(&raw)
            .map(|role| Caller { role })
            .ok_or_else(|| {
                CoreError::bad_params("role must be one of: staff, student")
                    .with_details(serde_json::json!({ "role": raw }))
            }),
    }
}

/// The date "now" is resolved against. Only this edge reads the clock.
pub fn reference_date(params: &Value) -> CoreResult<NaiveDate> {
    match optional_str(params, "referenceDate")? {
        Some(raw) => model::parse_date(&raw, "referenceDate"),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

pub fn offering_patch(params: &Value) -> CoreResult<MetaPatch<Option<Money>>> {
    match params.get("offering") {
        None => Ok(MetaPatch::Keep),
        Some(Value::Null) => Ok(MetaPatch::Clear),
        Some(v) => Ok(MetaPatch::Set(Some(Money::parse_json(v)?))),
    }
}

pub fn visitors_patch(params: &Value) -> CoreResult<MetaPatch<i64>> {
    match params.get("visitors") {
        None => Ok(MetaPatch::Keep),
        Some(Value::Null) => Ok(MetaPatch::Clear),
        Some(v) => match v.as_i64() {
            Some(n) if (0..=MAX_VISITORS).contains(&n) => Ok(MetaPatch::Set(n)),
            _ => Err(CoreError::bad_params(format!(
                "visitors must be an integer in 0..={}",
                MAX_VISITORS
            ))),
        },
    }
}

pub fn optional_bool(obj: &Value, key: &str) -> CoreResult<bool> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(CoreError::bad_params(format!("{} must be boolean", key))),
    }
}
