use crate::ipc::helpers::{db_query_err, get_required_str, require_db, require_row, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn subjects_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "subjects": [] }));
    };
    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.name,
               (SELECT COUNT(*) FROM teacher_assignments a WHERE a.subject_id = s.id)
             FROM subjects s
             ORDER BY s.name",
        )
        .map_err(db_query_err)?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "assignmentCount": r.get::<_, i64>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_err)?;
    Ok(json!({ "subjects": subjects }))
}

fn subjects_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_required_str(&req.params, "name")?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM subjects WHERE name = ? COLLATE NOCASE",
            [&name],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_query_err)?;
    if let Some(id) = existing {
        return Err(
            HandlerErr::new("already_exists", format!("subject {} already exists", name))
                .with_details(json!({ "subjectId": id })),
        );
    }

    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, name) VALUES(?, ?)",
        (&subject_id, &name),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "subjects" }))
    })?;
    Ok(json!({ "subjectId": subject_id, "name": name }))
}

/// Removes the subject and the assignments naming it. Stored cells that taught it
/// become free periods so saved grids stay complete.
fn subjects_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let subject_id = get_required_str(&req.params, "subjectId")?;
    require_row(conn, "subjects", &subject_id, "subject")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for (table, sql) in [
        (
            "timetable_slots",
            "UPDATE timetable_slots SET subject_id = NULL, teacher_id = NULL WHERE subject_id = ?",
        ),
        (
            "teacher_assignments",
            "DELETE FROM teacher_assignments WHERE subject_id = ?",
        ),
        ("subjects", "DELETE FROM subjects WHERE id = ?"),
    ] {
        tx.execute(sql, [&subject_id]).map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string()).with_details(json!({ "table": table }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(respond(&req.id, subjects_list(state))),
        "subjects.create" => Some(respond(&req.id, subjects_create(state, req))),
        "subjects.delete" => Some(respond(&req.id, subjects_delete(state, req))),
        _ => None,
    }
}
