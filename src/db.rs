use crate::model::{Money, MAX_OFFERING_CENTS, MAX_VISITORS};
use crate::session::{resolve_session_meta, MetaObservation, SessionConflict, SessionKey};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

pub const DB_FILE_NAME: &str = "attendance.sqlite3";

/// Class groups every workspace starts with, in display order.
pub const DEFAULT_CLASS_GROUPS: [(&str, &str); 4] = [
    ("adulto", "Adulto"),
    ("juvenil", "Juvenil"),
    ("infantil", "Infantil"),
    ("pre-adolescente", "Pré-adolescente"),
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    for (i, (id, name)) in DEFAULT_CLASS_GROUPS.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO class_groups(id, name, sort_order) VALUES(?, ?, ?)",
            (id, name, i as i64),
        )?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_group_id TEXT NOT NULL,
            name TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_name ON students(class_group_id, name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_meta(
            class_group_id TEXT NOT NULL,
            date TEXT NOT NULL,
            offering_cents INTEGER CHECK(offering_cents IS NULL OR offering_cents >= 0),
            visitor_count INTEGER NOT NULL DEFAULT 0 CHECK(visitor_count >= 0),
            updated_at TEXT,
            PRIMARY KEY(class_group_id, date),
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_meta_date ON session_meta(date)",
        [],
    )?;

    // Older workspaces stored offering/visitors on every attendance row.
    if table_exists(conn, "attendances")? && table_has_column(conn, "attendances", "offering")? {
        migrate_row_session_fields(conn)?;
    } else {
        create_attendances_table(conn)?;
    }
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendances_class_date
         ON attendances(class_group_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendances_date ON attendances(date)",
        [],
    )?;

    Ok(())
}

fn create_attendances_table(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendances(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            class_group_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('present', 'absent')),
            bible INTEGER NOT NULL DEFAULT 0,
            magazine INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            UNIQUE(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_group_id, date) REFERENCES session_meta(class_group_id, date)
        )",
        [],
    )?;
    Ok(())
}

/// Moves per-row `offering`/`visitors` columns into `session_meta` and rebuilds
/// `attendances` in the normalized shape. When rows of one session disagree,
/// the lowest attendance id wins; the disagreements are kept under the
/// `migration.sessionConflicts` setting for review.
fn migrate_row_session_fields(conn: &Connection) -> anyhow::Result<Vec<SessionConflict>> {
    let tx = conn.unchecked_transaction()?;

    let mut stmt = tx.prepare(
        "SELECT id, class_group_id, date, offering, COALESCE(visitors, 0)
         FROM attendances
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, NaiveDate>(2)?,
                r.get::<_, Option<f64>>(3)?,
                r.get::<_, i64>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let mut by_session: BTreeMap<SessionKey, Vec<MetaObservation>> = BTreeMap::new();
    for (id, class_group_id, date, offering, visitors) in rows {
        by_session
            .entry(SessionKey::new(date, class_group_id))
            .or_default()
            .push(MetaObservation {
                record_id: id,
                offering: offering.map(|o| {
                    let cents = (o * 100.0).round().clamp(0.0, MAX_OFFERING_CENTS as f64);
                    Money::from_cents(cents as i64)
                }),
                visitor_count: visitors.clamp(0, MAX_VISITORS),
            });
    }

    // Legacy rows may name class groups that were never seeded.
    tx.execute(
        "INSERT OR IGNORE INTO class_groups(id, name, sort_order)
         SELECT DISTINCT class_group_id, class_group_id, 100 FROM attendances",
        [],
    )?;

    let mut conflicts: Vec<SessionConflict> = Vec::new();
    for (key, observations) in &by_session {
        let (meta, mut found) = resolve_session_meta(key, observations);
        tx.execute(
            "INSERT INTO session_meta(class_group_id, date, offering_cents, visitor_count)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(class_group_id, date) DO NOTHING",
            (
                &meta.class_group_id,
                meta.date,
                meta.offering.map(Money::cents),
                meta.visitor_count,
            ),
        )?;
        conflicts.append(&mut found);
    }

    tx.execute("ALTER TABLE attendances RENAME TO attendances_legacy", [])?;
    create_attendances_table(&tx)?;
    tx.execute(
        "INSERT INTO attendances(id, student_id, class_group_id, date, status, bible, magazine)
         SELECT id, student_id, class_group_id, date,
                CASE WHEN lower(status) IN ('present', 'presente') THEN 'present' ELSE 'absent' END,
                CASE WHEN lower(status) IN ('present', 'presente')
                     THEN COALESCE(bible, 0) ELSE 0 END,
                CASE WHEN lower(status) IN ('present', 'presente')
                     THEN COALESCE(magazine, 0) ELSE 0 END
         FROM attendances_legacy",
        [],
    )?;
    tx.execute("DROP TABLE attendances_legacy", [])?;

    if !conflicts.is_empty() {
        settings_set_json(
            &tx,
            "migration.sessionConflicts",
            &serde_json::to_value(&conflicts)?,
        )?;
    }
    tx.commit()?;

    tracing::info!(
        sessions = by_session.len(),
        conflicts = conflicts.len(),
        "moved per-row session fields into session_meta"
    );
    Ok(conflicts)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> anyhow::Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table],
            |r| r.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_seeds_class_groups() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM class_groups", [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 4);
    }

    #[test]
    fn settings_round_trip() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("init");
        assert!(settings_get_json(&conn, "reports").expect("get").is_none());
        settings_set_json(&conn, "reports", &serde_json::json!({ "minYear": 2021 }))
            .expect("set");
        let v = settings_get_json(&conn, "reports").expect("get").expect("value");
        assert_eq!(v["minYear"], 2021);
    }

    #[test]
    fn legacy_row_fields_move_into_session_meta() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE class_groups(
                 id TEXT PRIMARY KEY, name TEXT NOT NULL, sort_order INTEGER NOT NULL
             );
             INSERT INTO class_groups VALUES('adulto', 'Adulto', 0);
             CREATE TABLE students(
                 id TEXT PRIMARY KEY, class_group_id TEXT NOT NULL, name TEXT NOT NULL,
                 updated_at TEXT
             );
             INSERT INTO students(id, class_group_id, name)
             VALUES('s1', 'adulto', 'Ana'), ('s2', 'adulto', 'Bia'), ('s3', 'juvenil', 'Caio');
             CREATE TABLE attendances(
                 id INTEGER PRIMARY KEY, student_id TEXT, class_group_id TEXT, date TEXT,
                 status TEXT, bible INTEGER, magazine INTEGER, offering REAL, visitors INTEGER
             );
             INSERT INTO attendances VALUES
                 (1, 's1', 'adulto', '2024-03-05', 'presente', 1, 0, 100.0, 5),
                 (2, 's2', 'adulto', '2024-03-05', 'ausente', 1, 1, 100.0, 5),
                 (3, 's1', 'adulto', '2024-03-12', 'presente', 0, 1, 20.0, 1),
                 (4, 's2', 'adulto', '2024-03-12', 'presente', 0, 0, 35.5, 1),
                 (5, 's3', 'juvenil', '2024-03-12', 'presente', 0, 0, NULL, 0),
                 (6, 's1', 'adulto', '2024-03-19', 'presente', 0, 0, 1e17, 5000000);",
        )
        .expect("legacy fixture");

        init_schema(&conn).expect("migrate");
        assert!(!table_has_column(&conn, "attendances", "offering").expect("columns"));

        let metas: Vec<(String, String, Option<i64>, i64)> = conn
            .prepare(
                "SELECT class_group_id, date, offering_cents, visitor_count
                 FROM session_meta ORDER BY date, class_group_id",
            )
            .expect("prepare")
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .expect("query")
            .collect::<Result<Vec<_>, _>>()
            .expect("rows");
        assert_eq!(
            metas,
            vec![
                ("adulto".to_string(), "2024-03-05".to_string(), Some(10_000), 5),
                ("adulto".to_string(), "2024-03-12".to_string(), Some(2_000), 1),
                ("juvenil".to_string(), "2024-03-12".to_string(), None, 0),
                (
                    "adulto".to_string(),
                    "2024-03-19".to_string(),
                    Some(MAX_OFFERING_CENTS),
                    MAX_VISITORS,
                ),
            ]
        );

        // Absent rows lose their material flags; statuses are normalized.
        let (status, bible): (String, i64) = conn
            .query_row("SELECT status, bible FROM attendances WHERE id = 2", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .expect("row 2");
        assert_eq!(status, "absent");
        assert_eq!(bible, 0);

        let conflicts = settings_get_json(&conn, "migration.sessionConflicts")
            .expect("get")
            .expect("conflicts recorded");
        let list = conflicts.as_array().expect("array");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["keptRecordId"], 3);
        assert_eq!(list[0]["conflictingRecordId"], 4);
        assert_eq!(list[0]["conflictingOffering"], "35.50");
    }
}
