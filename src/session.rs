use crate::model::{AttendanceRecord, Money, SessionMeta};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// One class group meeting on one date. Orders by date first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub date: NaiveDate,
    pub class_group_id: String,
}

impl SessionKey {
    pub fn new(date: NaiveDate, class_group_id: impl Into<String>) -> Self {
        Self {
            date,
            class_group_id: class_group_id.into(),
        }
    }

    pub fn of(record: &AttendanceRecord) -> Self {
        Self::new(record.date, record.class_group_id.clone())
    }
}

pub trait SessionMetaLookup {
    fn session_meta(&self, key: &SessionKey) -> Option<&SessionMeta>;
}

impl SessionMetaLookup for BTreeMap<SessionKey, SessionMeta> {
    fn session_meta(&self, key: &SessionKey) -> Option<&SessionMeta> {
        self.get(key)
    }
}

/// Groups records by (date, class group). Two classes meeting on the same day
/// stay separate. Records inside a group are ordered by record id.
pub fn group_by_session<'a, I>(records: I) -> BTreeMap<SessionKey, Vec<AttendanceRecord>>
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut groups: BTreeMap<SessionKey, Vec<AttendanceRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(SessionKey::of(r)).or_default().push(r.clone());
    }
    for rows in groups.values_mut() {
        rows.sort_by_key(|r| r.id);
    }
    groups
}

/// Session values as seen on one legacy row that stored them redundantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaObservation {
    pub record_id: i64,
    pub offering: Option<Money>,
    pub visitor_count: i64,
}

/// A row whose session values disagree with the value kept for its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConflict {
    pub session: SessionKey,
    pub kept_record_id: i64,
    pub conflicting_record_id: i64,
    pub kept_offering: Option<Money>,
    pub conflicting_offering: Option<Money>,
    pub kept_visitor_count: i64,
    pub conflicting_visitor_count: i64,
}

/// Picks the authoritative session values: the observation with the lowest
/// record id wins. Each disagreeing observation is logged and returned.
pub fn resolve_session_meta(
    key: &SessionKey,
    observations: &[MetaObservation],
) -> (SessionMeta, Vec<SessionConflict>) {
    let mut ordered: Vec<&MetaObservation> = observations.iter().collect();
    ordered.sort_by_key(|o| o.record_id);

    let Some(first) = ordered.first().copied() else {
        return (
            SessionMeta {
                class_group_id: key.class_group_id.clone(),
                date: key.date,
                offering: None,
                visitor_count: 0,
            },
            Vec::new(),
        );
    };

    let conflicts: Vec<SessionConflict> = ordered[1..]
        .iter()
        .filter(|o| o.offering != first.offering || o.visitor_count != first.visitor_count)
        .map(|o| SessionConflict {
            session: key.clone(),
            kept_record_id: first.record_id,
            conflicting_record_id: o.record_id,
            kept_offering: first.offering,
            conflicting_offering: o.offering,
            kept_visitor_count: first.visitor_count,
            conflicting_visitor_count: o.visitor_count,
        })
        .collect();

    for c in &conflicts {
        tracing::warn!(
            date = %c.session.date,
            class_group = %c.session.class_group_id,
            kept_record = c.kept_record_id,
            conflicting_record = c.conflicting_record_id,
            "inconsistent session data; keeping lowest record id"
        );
    }

    (
        SessionMeta {
            class_group_id: key.class_group_id.clone(),
            date: key.date,
            offering: first.offering,
            visitor_count: first.visitor_count,
        },
        conflicts,
    )
}
