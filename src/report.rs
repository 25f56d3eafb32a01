use crate::aggregate::{aggregate, session_details, AggregateStats, SessionDetail};
use crate::error::CoreResult;
use crate::model::ClassGroup;
use crate::period::{self, Period, PeriodType};
use crate::policy::Caller;
use crate::store;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStats {
    pub period: Period,
    pub stats: AggregateStats,
    pub details: Vec<SessionDetail>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub period_type: PeriodType,
    pub year: i32,
    /// `None` means every class group.
    pub class_group_id: Option<String>,
    pub periods: Vec<PeriodStats>,
    pub totals: AggregateStats,
    pub available_class_groups: Vec<ClassGroup>,
}

/// Buckets a year of attendance into periods. Periods never overlap, so the
/// grand totals still count each session once. Staff only.
pub fn build_period_report(
    conn: &Connection,
    year: i32,
    period_type: PeriodType,
    class_group_id: Option<&str>,
    caller: Caller,
) -> CoreResult<PeriodReport> {
    caller.require_staff("period report")?;
    let periods = period::partition(year, period_type)?;

    let snapshot = conn.unchecked_transaction()?;
    if let Some(cg) = class_group_id {
        store::require_class_group(&snapshot, cg)?;
    }
    let available_class_groups = store::list_class_groups(&snapshot)?;

    let mut totals = AggregateStats::default();
    let mut out: Vec<PeriodStats> = Vec::with_capacity(periods.len());
    for p in periods {
        let rows = store::records_in_range(&snapshot, class_group_id, p.start, p.end)?;
        let sessions = store::session_meta_in_range(&snapshot, class_group_id, p.start, p.end)?;
        let stats = aggregate(&rows, &sessions);
        totals += &stats;
        out.push(PeriodStats {
            details: session_details(&rows, &sessions),
            period: p,
            stats,
        });
    }

    Ok(PeriodReport {
        period_type,
        year,
        class_group_id: class_group_id.map(str::to_string),
        periods: out,
        totals,
        available_class_groups,
    })
}
