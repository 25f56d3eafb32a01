use crate::model::{AttendanceRecord, Money};
use crate::session::{group_by_session, SessionKey, SessionMetaLookup};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::AddAssign;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub presents: i64,
    pub absents: i64,
    pub with_bible: i64,
    pub with_magazine: i64,
    pub total_offering: Money,
    pub total_visitors: i64,
    pub unique_session_count: i64,
}

impl AggregateStats {
    pub fn total_classes(&self) -> i64 {
        self.presents + self.absents
    }
}

impl AddAssign<&AggregateStats> for AggregateStats {
    fn add_assign(&mut self, rhs: &AggregateStats) {
        self.presents += rhs.presents;
        self.absents += rhs.absents;
        self.with_bible += rhs.with_bible;
        self.with_magazine += rhs.with_magazine;
        self.total_offering += rhs.total_offering;
        self.total_visitors += rhs.total_visitors;
        self.unique_session_count += rhs.unique_session_count;
    }
}

/// Counts rows, then adds offering and visitors once per distinct
/// (date, class group) session. Sessions unknown to `sessions` add nothing.
pub fn aggregate<'a, I, L>(records: I, sessions: &L) -> AggregateStats
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
    L: SessionMetaLookup + ?Sized,
{
    let mut stats = AggregateStats::default();
    let mut seen: BTreeSet<SessionKey> = BTreeSet::new();

    for r in records {
        if r.is_present() {
            stats.presents += 1;
        } else {
            stats.absents += 1;
        }
        if r.brought_bible {
            stats.with_bible += 1;
        }
        if r.brought_magazine {
            stats.with_magazine += 1;
        }
        seen.insert(SessionKey::of(r));
    }

    for key in &seen {
        if let Some(meta) = sessions.session_meta(key) {
            stats.total_offering += meta.offering_or_zero();
            stats.total_visitors += meta.visitor_count;
        }
    }
    stats.unique_session_count = seen.len() as i64;
    stats
}

/// Per-session line of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub date: NaiveDate,
    pub class_group_id: String,
    pub presents: i64,
    pub absents: i64,
    pub with_bible: i64,
    pub with_magazine: i64,
    pub offering: Money,
    pub visitors: i64,
}

pub fn session_details<'a, I, L>(records: I, sessions: &L) -> Vec<SessionDetail>
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
    L: SessionMetaLookup + ?Sized,
{
    group_by_session(records)
        .into_iter()
        .map(|(key, rows)| {
            let stats = aggregate(&rows, sessions);
            SessionDetail {
                date: key.date,
                class_group_id: key.class_group_id,
                presents: stats.presents,
                absents: stats.absents,
                with_bible: stats.with_bible,
                with_magazine: stats.with_magazine,
                offering: stats.total_offering,
                visitors: stats.total_visitors,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceStatus, SessionMeta};
    use std::collections::BTreeMap;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rec(
        id: i64,
        class: &str,
        day: &str,
        status: AttendanceStatus,
        bible: bool,
    ) -> AttendanceRecord {
        AttendanceRecord {
            id,
            student_id: format!("s{}", id),
            class_group_id: class.to_string(),
            date: date(day),
            status,
            brought_bible: bible,
            brought_magazine: false,
        }
    }

    fn meta(class: &str, day: &str, cents: i64, visitors: i64) -> (SessionKey, SessionMeta) {
        (
            SessionKey::new(date(day), class),
            SessionMeta {
                class_group_id: class.to_string(),
                date: date(day),
                offering: Some(Money::from_cents(cents)),
                visitor_count: visitors,
            },
        )
    }

    #[test]
    fn empty_input_is_all_zero() {
        let lookup: BTreeMap<SessionKey, SessionMeta> = BTreeMap::new();
        let stats = aggregate(&Vec::<AttendanceRecord>::new(), &lookup);
        assert_eq!(stats, AggregateStats::default());
        assert_eq!(stats.total_offering, Money::ZERO);
        assert_eq!(stats.total_classes(), 0);
    }

    #[test]
    fn shared_offering_counts_once_per_session() {
        let rows: Vec<AttendanceRecord> = (1..=3)
            .map(|i| rec(i, "adulto", "2024-03-05", AttendanceStatus::Present, i == 1))
            .collect();
        let lookup: BTreeMap<_, _> =
            [meta("adulto", "2024-03-05", 10_000, 5)].into_iter().collect();

        let stats = aggregate(&rows, &lookup);
        assert_eq!(stats.presents, 3);
        assert_eq!(stats.absents, 0);
        assert_eq!(stats.with_bible, 1);
        assert_eq!(stats.total_offering, Money::from_cents(10_000));
        assert_eq!(stats.total_visitors, 5);
        assert_eq!(stats.unique_session_count, 1);
    }

    #[test]
    fn sessions_of_different_classes_on_one_day_both_count() {
        let rows = vec![
            rec(1, "adulto", "2024-03-05", AttendanceStatus::Present, false),
            rec(2, "adulto", "2024-03-05", AttendanceStatus::Absent, false),
            rec(3, "juvenil", "2024-03-05", AttendanceStatus::Present, false),
        ];
        let lookup: BTreeMap<_, _> = [
            meta("adulto", "2024-03-05", 5_000, 2),
            meta("juvenil", "2024-03-05", 1_250, 1),
        ]
        .into_iter()
        .collect();

        let stats = aggregate(&rows, &lookup);
        assert_eq!(stats.unique_session_count, 2);
        assert_eq!(stats.total_offering, Money::from_cents(6_250));
        assert_eq!(stats.total_visitors, 3);
        assert_eq!(stats.absents, 1);

        let details = session_details(&rows, &lookup);
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].class_group_id, "adulto");
        assert_eq!(details[0].presents, 1);
        assert_eq!(details[0].absents, 1);
        assert_eq!(details[0].offering, Money::from_cents(5_000));
        assert_eq!(details[1].offering, Money::from_cents(1_250));
    }

    #[test]
    fn unknown_session_contributes_no_offering() {
        let rows = vec![rec(1, "infantil", "2024-06-02", AttendanceStatus::Present, true)];
        let lookup: BTreeMap<SessionKey, SessionMeta> = BTreeMap::new();
        let stats = aggregate(&rows, &lookup);
        assert_eq!(stats.unique_session_count, 1);
        assert_eq!(stats.total_offering, Money::ZERO);
        assert_eq!(stats.with_bible, 1);
    }

    #[test]
    fn add_assign_sums_every_field() {
        let mut total = AggregateStats::default();
        let part = AggregateStats {
            presents: 2,
            absents: 1,
            with_bible: 1,
            with_magazine: 1,
            total_offering: Money::from_cents(150),
            total_visitors: 4,
            unique_session_count: 1,
        };
        total += &part;
        total += &part;
        assert_eq!(total.presents, 4);
        assert_eq!(total.total_offering, Money::from_cents(300));
        assert_eq!(total.unique_session_count, 2);
    }
}
