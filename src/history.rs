use crate::aggregate::{aggregate, AggregateStats};
use crate::error::{CoreError, CoreResult};
use crate::model::{AttendanceRecord, SessionMeta, Student};
use crate::period::{self, Period, PeriodType};
use crate::policy::Caller;
use crate::session::SessionKey;
use crate::store;
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub period_type: PeriodType,
    pub year: i32,
    pub month: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub id: String,
    pub name: String,
    pub class_group_id: String,
}

impl From<&Student> for StudentRef {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            class_group_id: s.class_group_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryWindow {
    #[serde(rename = "type")]
    pub period_type: PeriodType,
    pub year: i32,
    pub month: Option<u32>,
    #[serde(flatten)]
    pub period: Period,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub total_classes: i64,
    pub presents: i64,
    pub absents: i64,
    pub attendance_percentage: i64,
    pub stats: AggregateStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBreakdown {
    pub month: u32,
    pub label: String,
    pub total_classes: i64,
    pub presents: i64,
    pub absents: i64,
}

/// Summary and breakdown cover the whole calendar year; `attendances` lists
/// only the rows inside `period`, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentHistory {
    pub student: StudentRef,
    pub period: HistoryWindow,
    pub summary: HistorySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_breakdown: Option<Vec<MonthBreakdown>>,
    pub attendances: Vec<AttendanceRecord>,
}

/// `round(presents / total * 100)`, half away from zero; 0 for an empty year.
pub fn attendance_percentage(presents: i64, total_classes: i64) -> i64 {
    if total_classes <= 0 {
        return 0;
    }
    ((presents as f64 / total_classes as f64) * 100.0).round() as i64
}

/// Window shown for a history query:
/// - monthly: the given month, or the whole year when no month is given;
/// - quarterly: the quarter holding `month`, else the quarter holding
///   `reference_date`'s month;
/// - yearly: the whole year.
pub fn resolve_window(query: &HistoryQuery, reference_date: NaiveDate) -> CoreResult<Period> {
    if let Some(m) = query.month {
        if !(1..=12).contains(&m) {
            return Err(CoreError::bad_params("month must be between 1 and 12"));
        }
    }
    match query.period_type {
        PeriodType::Monthly => match query.month {
            Some(m) => period::month_period(query.year, m),
            None => period::year_period(query.year),
        },
        PeriodType::Quarterly => {
            let m = query.month.unwrap_or_else(|| reference_date.month());
            period::quarter_period(query.year, period::quarter_of_month(m))
        }
        PeriodType::Yearly => period::year_period(query.year),
    }
}

fn monthly_breakdown(rows: &[AttendanceRecord]) -> Vec<MonthBreakdown> {
    let mut by_month: BTreeMap<u32, (i64, i64)> = BTreeMap::new();
    for r in rows {
        let e = by_month.entry(r.date.month()).or_insert((0, 0));
        if r.is_present() {
            e.0 += 1;
        } else {
            e.1 += 1;
        }
    }
    by_month
        .into_iter()
        .map(|(month, (presents, absents))| MonthBreakdown {
            month,
            label: period::month_label(month).to_string(),
            total_classes: presents + absents,
            presents,
            absents,
        })
        .collect()
}

fn history_for(
    conn: &Connection,
    student: &Student,
    query: &HistoryQuery,
    window: &Period,
    year: &Period,
    sessions: &BTreeMap<SessionKey, SessionMeta>,
) -> CoreResult<StudentHistory> {
    let year_rows = store::records_for_student(conn, &student.id, year.start, year.end)?;

    let stats = aggregate(&year_rows, sessions);
    let total_classes = stats.total_classes();
    let summary = HistorySummary {
        total_classes,
        presents: stats.presents,
        absents: stats.absents,
        attendance_percentage: attendance_percentage(stats.presents, total_classes),
        stats,
    };

    let monthly_breakdown = match query.period_type {
        PeriodType::Quarterly => Some(monthly_breakdown(&year_rows)),
        _ => None,
    };

    let mut attendances: Vec<AttendanceRecord> = year_rows
        .into_iter()
        .filter(|r| window.contains(r.date))
        .collect();
    attendances.reverse();

    Ok(StudentHistory {
        student: StudentRef::from(student),
        period: HistoryWindow {
            period_type: query.period_type,
            year: query.year,
            month: query.month,
            period: window.clone(),
        },
        summary,
        monthly_breakdown,
        attendances,
    })
}

/// History of one student. Open to every caller.
pub fn build_history(
    conn: &Connection,
    student_id: &str,
    query: &HistoryQuery,
    reference_date: NaiveDate,
) -> CoreResult<StudentHistory> {
    let window = resolve_window(query, reference_date)?;
    let year = period::year_period(query.year)?;

    let snapshot = conn.unchecked_transaction()?;
    let student = store::get_student(&snapshot, student_id)?;
    let sessions = store::session_meta_in_range(&snapshot, None, year.start, year.end)?;
    history_for(&snapshot, &student, query, &window, &year, &sessions)
}

/// One history per enrolled student, ordered by name. Staff only.
pub fn build_class_history(
    conn: &Connection,
    class_group_id: &str,
    query: &HistoryQuery,
    reference_date: NaiveDate,
    caller: Caller,
) -> CoreResult<Vec<StudentHistory>> {
    caller.require_staff("class history")?;
    let window = resolve_window(query, reference_date)?;
    let year = period::year_period(query.year)?;

    let snapshot = conn.unchecked_transaction()?;
    store::require_class_group(&snapshot, class_group_id)?;
    let students = store::list_students(&snapshot, class_group_id)?;
    let sessions = store::session_meta_in_range(&snapshot, None, year.start, year.end)?;
    let histories = students
        .iter()
        .map(|s| history_for(&snapshot, s, query, &window, &year, &sessions))
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(histories)
}
