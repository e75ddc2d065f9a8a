use crate::ipc::helpers::{
    db_query_err, get_optional_str, get_required_str, require_db, require_row, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::params_from_iter;
use serde_json::json;
use uuid::Uuid;

fn assignments_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "assignments": [] }));
    };
    let class_id = get_optional_str(&req.params, "classId")?;

    let mut sql = String::from(
        "SELECT a.id, a.class_id, c.name, a.subject_id, s.name, a.teacher_id, t.name
         FROM teacher_assignments a
         JOIN classes c ON c.id = a.class_id
         JOIN subjects s ON s.id = a.subject_id
         LEFT JOIN teachers t ON t.id = a.teacher_id",
    );
    let mut bind: Vec<Value> = Vec::new();
    if let Some(cid) = class_id {
        sql.push_str(" WHERE a.class_id = ?");
        bind.push(Value::Text(cid));
    }
    sql.push_str(" ORDER BY c.sort_order, c.name, a.sort_order, a.rowid");

    let mut stmt = conn.prepare(&sql).map_err(db_query_err)?;
    let assignments = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "classId": r.get::<_, String>(1)?,
                "className": r.get::<_, String>(2)?,
                "subjectId": r.get::<_, String>(3)?,
                "subjectName": r.get::<_, String>(4)?,
                "teacherId": r.get::<_, Option<String>>(5)?,
                "teacherName": r.get::<_, Option<String>>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_err)?;
    Ok(json!({ "assignments": assignments }))
}

fn assignments_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    let subject_id = get_required_str(&req.params, "subjectId")?;
    let teacher_id = get_optional_str(&req.params, "teacherId")?;

    require_row(conn, "classes", &class_id, "class")?;
    require_row(conn, "subjects", &subject_id, "subject")?;
    if let Some(t) = teacher_id.as_deref() {
        require_row(conn, "teachers", t, "teacher")?;
    }

    // Appended after the class's existing assignments; this is the order the generator scans.
    let next_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM teacher_assignments WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(db_query_err)?;

    let assignment_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teacher_assignments(id, class_id, subject_id, teacher_id, sort_order)
         VALUES(?, ?, ?, ?, ?)",
        (&assignment_id, &class_id, &subject_id, &teacher_id, next_order),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "teacher_assignments" }))
    })?;

    Ok(json!({
        "assignmentId": assignment_id,
        "classId": class_id,
        "subjectId": subject_id,
        "teacherId": teacher_id,
        "sortOrder": next_order,
    }))
}

fn assignments_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assignment_id = get_required_str(&req.params, "assignmentId")?;
    require_row(conn, "teacher_assignments", &assignment_id, "assignment")?;
    conn.execute(
        "DELETE FROM teacher_assignments WHERE id = ?",
        [&assignment_id],
    )
    .map_err(|e| {
        HandlerErr::new("db_delete_failed", e.to_string())
            .with_details(json!({ "table": "teacher_assignments" }))
    })?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(respond(&req.id, assignments_list(state, req))),
        "assignments.create" => Some(respond(&req.id, assignments_create(state, req))),
        "assignments.delete" => Some(respond(&req.id, assignments_delete(state, req))),
        _ => None,
    }
}
