use crate::timetable::{
    ClassSection, Subject, TeacherAssignment, Timetable, TimetableError, TimetableInputs, Weekday,
};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

pub const DB_FILE_NAME: &str = "school.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade TEXT,
            homeroom_teacher_id TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(homeroom_teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    // Workspaces created before class ordering existed lack these columns.
    ensure_classes_columns(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_assignments(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            teacher_id TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_assignments_class ON teacher_assignments(class_id, sort_order)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_assignments_teacher ON teacher_assignments(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_slots(
            class_id TEXT NOT NULL,
            day INTEGER NOT NULL,
            period INTEGER NOT NULL,
            subject_id TEXT,
            teacher_id TEXT,
            generated_at TEXT NOT NULL,
            PRIMARY KEY(class_id, day, period),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_slots_teacher ON timetable_slots(teacher_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_classes_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "classes", "grade")? {
        conn.execute("ALTER TABLE classes ADD COLUMN grade TEXT", [])?;
    }
    if !table_has_column(conn, "classes", "homeroom_teacher_id")? {
        conn.execute("ALTER TABLE classes ADD COLUMN homeroom_teacher_id TEXT", [])?;
    }
    if table_has_column(conn, "classes", "sort_order")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE classes ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0",
        [],
    )?;

    // Backfill using insert order as a best-effort.
    let mut stmt = conn.prepare("SELECT id FROM classes ORDER BY rowid")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for (i, id) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE classes SET sort_order = ? WHERE id = ?",
            (i as i64, id),
        )?;
    }
    Ok(())
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

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is not valid json", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn load_classes(conn: &Connection) -> rusqlite::Result<Vec<ClassSection>> {
    let mut stmt = conn.prepare("SELECT id, name FROM classes ORDER BY sort_order, name, rowid")?;
    let rows = stmt.query_map([], |r| {
        Ok(ClassSection {
            id: r.get(0)?,
            name: r.get(1)?,
        })
    })?;
    rows.collect()
}

fn load_subjects(conn: &Connection) -> rusqlite::Result<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT id, name FROM subjects ORDER BY name")?;
    let rows = stmt.query_map([], |r| {
        Ok(Subject {
            id: r.get(0)?,
            name: r.get(1)?,
        })
    })?;
    rows.collect()
}

fn load_assignments(conn: &Connection) -> rusqlite::Result<Vec<TeacherAssignment>> {
    let mut stmt = conn.prepare(
        "SELECT class_id, subject_id, teacher_id
         FROM teacher_assignments
         ORDER BY class_id, sort_order, rowid",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(TeacherAssignment {
            class_id: r.get(0)?,
            subject_id: r.get(1)?,
            teacher_id: r.get(2)?,
        })
    })?;
    rows.collect()
}

/// Fresh snapshot for one generation run. Any failed read aborts the whole run.
pub fn load_timetable_inputs(conn: &Connection) -> Result<TimetableInputs, TimetableError> {
    let classes = load_classes(conn).map_err(|e| TimetableError::unavailable("classes", e.to_string()))?;
    let subjects =
        load_subjects(conn).map_err(|e| TimetableError::unavailable("subjects", e.to_string()))?;
    let assignments = load_assignments(conn)
        .map_err(|e| TimetableError::unavailable("assignments", e.to_string()))?;
    TimetableInputs::from_parts(Some(classes), Some(subjects), Some(assignments))
}

/// Replaces every stored slot with the given timetable. Returns the number of rows written.
pub fn save_timetable(conn: &Connection, timetable: &Timetable, generated_at: &str) -> anyhow::Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to begin timetable transaction")?;
    tx.execute("DELETE FROM timetable_slots", [])
        .context("failed to clear stored timetable")?;
    let mut written = 0usize;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO timetable_slots(class_id, day, period, subject_id, teacher_id, generated_at)
             VALUES(?, ?, ?, ?, ?, ?)",
        )?;
        for class in &timetable.classes {
            for slot in &class.slots {
                stmt.execute((
                    &class.class_id,
                    slot.day.index(),
                    i64::from(slot.period),
                    &slot.subject_id,
                    &slot.teacher_id,
                    generated_at,
                ))
                .with_context(|| format!("failed to store slot for class {}", class.class_id))?;
                written += 1;
            }
        }
    }
    tx.commit().context("failed to commit timetable")?;
    Ok(written)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSlot {
    pub class_id: String,
    pub day: Weekday,
    pub period: i64,
    pub subject_id: Option<String>,
    pub teacher_id: Option<String>,
    pub generated_at: String,
}

fn query_stored_slots(
    conn: &Connection,
    filter_column: &str,
    value: &str,
) -> anyhow::Result<Vec<StoredSlot>> {
    let sql = format!(
        "SELECT class_id, day, period, subject_id, teacher_id, generated_at
         FROM timetable_slots
         WHERE {} = ?
         ORDER BY day, period, class_id",
        filter_column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([value], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (class_id, day, period, subject_id, teacher_id, generated_at) in rows {
        let day = Weekday::from_index(day)
            .with_context(|| format!("stored slot has invalid day index {}", day))?;
        out.push(StoredSlot {
            class_id,
            day,
            period,
            subject_id,
            teacher_id,
            generated_at,
        });
    }
    Ok(out)
}

pub fn load_saved_slots(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<StoredSlot>> {
    query_stored_slots(conn, "class_id", class_id)
}

pub fn load_saved_teacher_slots(conn: &Connection, teacher_id: &str) -> anyhow::Result<Vec<StoredSlot>> {
    query_stored_slots(conn, "teacher_id", teacher_id)
}

pub fn name_lookup(conn: &Connection, table: &str) -> anyhow::Result<HashMap<String, String>> {
    let sql = format!("SELECT id, name FROM {}", table);
    let mut stmt = conn.prepare(&sql)?;
    let rows: HashMap<String, String> = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<_, _>>()?;
    Ok(rows)
}
