use crate::db;
use crate::ipc::error::{err, no_workspace, ok};
use crate::ipc::types::{AppState, Request};
use crate::period::PeriodType;
use serde_json::{json, Map, Value};

pub const DEFAULT_MIN_YEAR: i64 = 2020;
pub const DEFAULT_MAX_YEAR: i64 = 2100;

#[derive(Clone, Copy)]
enum SetupSection {
    Reports,
    History,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::Reports, SetupSection::History];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "reports" => Some(Self::Reports),
            "history" => Some(Self::History),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Reports => "reports",
            Self::History => "history",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Reports => "setup.reports",
            Self::History => "setup.history",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Reports => json!({
            "minYear": DEFAULT_MIN_YEAR,
            "maxYear": DEFAULT_MAX_YEAR
        }),
        SetupSection::History => json!({
            "defaultPeriodType": "quarterly"
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Reports => match k.as_str() {
                "minYear" | "maxYear" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 9999)?));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
            SetupSection::History => match k.as_str() {
                "defaultPeriodType" => {
                    let raw = v
                        .as_str()
                        .ok_or_else(|| format!("{} must be string", k))?;
                    let t = PeriodType::parse(raw).map_err(|e| e.message)?;
                    obj.insert(k.clone(), Value::String(t.as_str().to_string()));
                }
                _ => return Err(format!("unknown history field: {}", k)),
            },
        }
    }
    if let SetupSection::Reports = section {
        let min = obj.get("minYear").and_then(|v| v.as_i64()).unwrap_or(DEFAULT_MIN_YEAR);
        let max = obj.get("maxYear").and_then(|v| v.as_i64()).unwrap_or(DEFAULT_MAX_YEAR);
        if min > max {
            return Err("minYear must not exceed maxYear".into());
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let mut candidate = current.clone();
            if merge_section_patch(section, &mut candidate, saved_obj).is_ok() {
                current = candidate;
            }
        }
    }
    Ok(current)
}

/// Accepted report years; defaults when settings are unreadable.
pub fn year_bounds(conn: &rusqlite::Connection) -> (i64, i64) {
    let section = load_section(conn, SetupSection::Reports)
        .unwrap_or_else(|_| default_section(SetupSection::Reports));
    (
        section["minYear"].as_i64().unwrap_or(DEFAULT_MIN_YEAR),
        section["maxYear"].as_i64().unwrap_or(DEFAULT_MAX_YEAR),
    )
}

pub fn default_period_type(conn: &rusqlite::Connection) -> PeriodType {
    load_section(conn, SetupSection::History)
        .ok()
        .and_then(|s| s["defaultPeriodType"].as_str().map(str::to_string))
        .and_then(|raw| PeriodType::parse(&raw).ok())
        .unwrap_or(PeriodType::Quarterly)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.name(), "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
