use crate::error::{CoreError, CoreResult};
use crate::model::{
    AttendanceRecord, AttendanceStatus, ClassGroup, Money, SessionMeta, Student, MAX_OFFERING_CENTS,
    MAX_VISITORS,
};
use crate::session::SessionKey;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// How a save treats one shared session field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaPatch<T> {
    /// Field omitted: keep the stored value.
    Keep,
    /// Explicit null: reset to the default.
    Clear,
    Set(T),
}

impl<T: Copy> MetaPatch<T> {
    fn apply(self, current: T, cleared: T) -> T {
        match self {
            MetaPatch::Keep => current,
            MetaPatch::Clear => cleared,
            MetaPatch::Set(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub student_id: String,
    pub status: AttendanceStatus,
    pub brought_bible: bool,
    pub brought_magazine: bool,
}

#[derive(Debug, Clone)]
pub struct SaveSession {
    pub class_group_id: String,
    pub date: NaiveDate,
    pub offering: MetaPatch<Option<Money>>,
    pub visitors: MetaPatch<i64>,
    pub entries: Vec<SessionEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub saved: usize,
    pub session: SessionMeta,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub attendance_id: i64,
    pub student_id: String,
    pub student_name: String,
    pub status: AttendanceStatus,
    pub brought_bible: bool,
    pub brought_magazine: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRoster {
    pub class_group_id: String,
    pub date: NaiveDate,
    pub session: Option<SessionMeta>,
    pub attendances: Vec<RosterEntry>,
    pub total: usize,
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn status_from_sql(raw: &str) -> rusqlite::Result<AttendanceStatus> {
    AttendanceStatus::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown attendance status: {}", raw).into(),
        )
    })
}

const RECORD_COLUMNS: &str =
    "id, student_id, class_group_id, date, status, bible, magazine";

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let status: String = r.get(4)?;
    Ok(AttendanceRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        class_group_id: r.get(2)?,
        date: r.get(3)?,
        status: status_from_sql(&status)?,
        brought_bible: r.get::<_, i64>(5)? != 0,
        brought_magazine: r.get::<_, i64>(6)? != 0,
    })
}

fn session_meta_from_row(r: &Row<'_>) -> rusqlite::Result<SessionMeta> {
    Ok(SessionMeta {
        class_group_id: r.get(0)?,
        date: r.get(1)?,
        offering: r.get::<_, Option<i64>>(2)?.map(Money::from_cents),
        visitor_count: r.get(3)?,
    })
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        class_group_id: r.get(1)?,
        name: r.get(2)?,
    })
}

/// Sort/match key that ignores case and accents. SQLite's NOCASE only folds
/// ASCII, so names are folded here instead.
fn name_key(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

pub fn list_class_groups(conn: &Connection) -> CoreResult<Vec<ClassGroup>> {
    let mut stmt = conn.prepare("SELECT id, name FROM class_groups ORDER BY sort_order, id")?;
    let groups = stmt
        .query_map([], |r| {
            Ok(ClassGroup {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(groups)
}

pub fn require_class_group(conn: &Connection, class_group_id: &str) -> CoreResult<ClassGroup> {
    conn.query_row(
        "SELECT id, name FROM class_groups WHERE id = ?",
        [class_group_id],
        |r| {
            Ok(ClassGroup {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| CoreError::invalid_class_group(class_group_id))
}

pub fn create_student(conn: &Connection, class_group_id: &str, name: &str) -> CoreResult<Student> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::bad_params("name must not be empty"));
    }
    require_class_group(conn, class_group_id)?;
    let student = Student {
        id: Uuid::new_v4().to_string(),
        class_group_id: class_group_id.to_string(),
        name: name.to_string(),
    };
    conn.execute(
        "INSERT INTO students(id, class_group_id, name, updated_at) VALUES(?, ?, ?, ?)",
        (&student.id, &student.class_group_id, &student.name, now_stamp()),
    )?;
    Ok(student)
}

/// Students of a class ordered by name; ties keep a stable id order.
pub fn list_students(conn: &Connection, class_group_id: &str) -> CoreResult<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_group_id, name
         FROM students
         WHERE class_group_id = ?",
    )?;
    let mut students = stmt
        .query_map([class_group_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    students.sort_by_cached_key(|s| (name_key(&s.name), s.id.clone()));
    Ok(students)
}

pub fn get_student(conn: &Connection, student_id: &str) -> CoreResult<Student> {
    conn.query_row(
        "SELECT id, class_group_id, name FROM students WHERE id = ?",
        [student_id],
        student_from_row,
    )
    .optional()?
    .ok_or_else(|| {
        CoreError::not_found("student not found").with_details(json!({ "studentId": student_id }))
    })
}

/// Substring match on the student name ignoring case and accents, first by name.
pub fn find_student_by_name(
    conn: &Connection,
    name: &str,
    class_group_id: Option<&str>,
) -> CoreResult<Student> {
    let needle = name_key(name.trim());
    if needle.is_empty() {
        return Err(CoreError::bad_params("studentName must not be empty"));
    }
    if let Some(cg) = class_group_id {
        require_class_group(conn, cg)?;
    }
    let mut stmt = conn.prepare(
        "SELECT id, class_group_id, name
         FROM students
         WHERE ?1 IS NULL OR class_group_id = ?1",
    )?;
    let students = stmt
        .query_map([class_group_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    students
        .into_iter()
        .map(|s| (name_key(&s.name), s))
        .filter(|(key, _)| key.contains(&needle))
        .min_by(|(ka, a), (kb, b)| ka.cmp(kb).then_with(|| a.id.cmp(&b.id)))
        .map(|(_, s)| s)
        .ok_or_else(|| {
            CoreError::not_found("no student matches name")
                .with_details(json!({ "studentName": name.trim() }))
        })
}

pub fn session_meta(
    conn: &Connection,
    class_group_id: &str,
    date: NaiveDate,
) -> CoreResult<Option<SessionMeta>> {
    let meta = conn
        .query_row(
            "SELECT class_group_id, date, offering_cents, visitor_count
             FROM session_meta
             WHERE class_group_id = ? AND date = ?",
            (class_group_id, date),
            session_meta_from_row,
        )
        .optional()?;
    Ok(meta)
}

/// Writes every entry and the shared session values in one transaction.
/// Nothing is kept if any entry fails.
pub fn save_session(conn: &Connection, input: &SaveSession) -> CoreResult<SaveOutcome> {
    if input.entries.is_empty() {
        return Err(CoreError::bad_params("attendances must not be empty"));
    }
    if let MetaPatch::Set(Some(offering)) = input.offering {
        if !(0..=MAX_OFFERING_CENTS).contains(&offering.cents()) {
            return Err(CoreError::bad_params("offering is out of range")
                .with_details(json!({ "offering": offering })));
        }
    }
    if let MetaPatch::Set(visitors) = input.visitors {
        if !(0..=MAX_VISITORS).contains(&visitors) {
            return Err(CoreError::bad_params("visitors is out of range")
                .with_details(json!({ "visitors": visitors })));
        }
    }

    let tx = conn.unchecked_transaction()?;
    require_class_group(&tx, &input.class_group_id)?;

    for entry in &input.entries {
        let exists = tx
            .query_row("SELECT 1 FROM students WHERE id = ?", [&entry.student_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if !exists {
            return Err(CoreError::not_found("student not found")
                .with_details(json!({ "studentId": entry.student_id })));
        }
    }

    let current = session_meta(&tx, &input.class_group_id, input.date)?;
    let (current_offering, current_visitors) = current
        .as_ref()
        .map(|m| (m.offering, m.visitor_count))
        .unwrap_or((None, 0));
    let session = SessionMeta {
        class_group_id: input.class_group_id.clone(),
        date: input.date,
        offering: input.offering.apply(current_offering, None),
        visitor_count: input.visitors.apply(current_visitors, 0),
    };
    let stamp = now_stamp();
    tx.execute(
        "INSERT INTO session_meta(class_group_id, date, offering_cents, visitor_count, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(class_group_id, date) DO UPDATE SET
           offering_cents = excluded.offering_cents,
           visitor_count = excluded.visitor_count,
           updated_at = excluded.updated_at",
        (
            &session.class_group_id,
            session.date,
            session.offering.map(Money::cents),
            session.visitor_count,
            &stamp,
        ),
    )?;

    for entry in &input.entries {
        let present = entry.status == AttendanceStatus::Present;
        tx.execute(
            "INSERT INTO attendances(
               student_id, class_group_id, date, status, bible, magazine, updated_at
             )
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET
               class_group_id = excluded.class_group_id,
               status = excluded.status,
               bible = excluded.bible,
               magazine = excluded.magazine,
               updated_at = excluded.updated_at",
            (
                &entry.student_id,
                &input.class_group_id,
                input.date,
                entry.status.as_str(),
                present && entry.brought_bible,
                present && entry.brought_magazine,
                &stamp,
            ),
        )?;
    }
    tx.commit()?;

    tracing::info!(
        class_group = %input.class_group_id,
        date = %input.date,
        saved = input.entries.len(),
        "attendance session saved"
    );
    Ok(SaveOutcome {
        saved: input.entries.len(),
        session,
    })
}

pub fn session_open(
    conn: &Connection,
    class_group_id: &str,
    date: NaiveDate,
) -> CoreResult<SessionRoster> {
    require_class_group(conn, class_group_id)?;
    let session = session_meta(conn, class_group_id, date)?;
    let mut stmt = conn.prepare(
        "SELECT a.id, a.student_id, s.name, a.status, a.bible, a.magazine
         FROM attendances a
         JOIN students s ON s.id = a.student_id
         WHERE a.class_group_id = ? AND a.date = ?",
    )?;
    let mut attendances = stmt
        .query_map((class_group_id, date), |r| {
            let status: String = r.get(3)?;
            Ok(RosterEntry {
                attendance_id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: r.get(2)?,
                status: status_from_sql(&status)?,
                brought_bible: r.get::<_, i64>(4)? != 0,
                brought_magazine: r.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    attendances.sort_by_cached_key(|e| (name_key(&e.student_name), e.student_id.clone()));
    Ok(SessionRoster {
        class_group_id: class_group_id.to_string(),
        date,
        session,
        total: attendances.len(),
        attendances,
    })
}

/// Removes one attendance row. The session's shared values stay.
pub fn delete_attendance(conn: &Connection, attendance_id: i64) -> CoreResult<()> {
    let n = conn.execute("DELETE FROM attendances WHERE id = ?", [attendance_id])?;
    if n == 0 {
        return Err(CoreError::not_found("attendance not found")
            .with_details(json!({ "attendanceId": attendance_id })));
    }
    tracing::info!(attendance_id, "attendance removed");
    Ok(())
}

pub fn records_for_student(
    conn: &Connection,
    student_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> CoreResult<Vec<AttendanceRecord>> {
    let sql = format!(
        "SELECT {} FROM attendances
         WHERE student_id = ? AND date BETWEEN ? AND ?
         ORDER BY date, id",
        RECORD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((student_id, start, end), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records in `[start, end]`, optionally limited to one class group.
pub fn records_in_range(
    conn: &Connection,
    class_group_id: Option<&str>,
    start: NaiveDate,
    end: NaiveDate,
) -> CoreResult<Vec<AttendanceRecord>> {
    let sql = format!(
        "SELECT {} FROM attendances
         WHERE date BETWEEN ?1 AND ?2
           AND (?3 IS NULL OR class_group_id = ?3)
         ORDER BY date, class_group_id, id",
        RECORD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((start, end, class_group_id), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn session_meta_in_range(
    conn: &Connection,
    class_group_id: Option<&str>,
    start: NaiveDate,
    end: NaiveDate,
) -> CoreResult<BTreeMap<SessionKey, SessionMeta>> {
    let mut stmt = conn.prepare(
        "SELECT class_group_id, date, offering_cents, visitor_count
         FROM session_meta
         WHERE date BETWEEN ?1 AND ?2
           AND (?3 IS NULL OR class_group_id = ?3)",
    )?;
    let metas = stmt
        .query_map((start, end, class_group_id), session_meta_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(metas
        .into_iter()
        .map(|m| (SessionKey::new(m.date, m.class_group_id.clone()), m))
        .collect())
}
