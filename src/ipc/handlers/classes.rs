use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, require_row, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.grade,
           c.homeroom_teacher_id,
           (SELECT COUNT(*) FROM teacher_assignments a WHERE a.class_id = c.id) AS assignment_count,
           (SELECT COUNT(*) FROM timetable_slots s
             WHERE s.class_id = c.id AND s.teacher_id IS NOT NULL) AS scheduled_periods
         FROM classes c
         ORDER BY c.sort_order, c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let grade: Option<String> = row.get(2)?;
            let homeroom: Option<String> = row.get(3)?;
            let assignment_count: i64 = row.get(4)?;
            let scheduled_periods: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "grade": grade,
                "homeroomTeacherId": homeroom,
                "assignmentCount": assignment_count,
                "scheduledPeriods": scheduled_periods
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match get_required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let grade = match get_optional_str(&req.params, "grade") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let homeroom = match get_optional_str(&req.params, "homeroomTeacherId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Some(t) = homeroom.as_deref() {
        if let Err(e) = require_row(conn, "teachers", t, "teacher") {
            return e.response(&req.id);
        }
    }

    let next_order: i64 = match conn
        .query_row("SELECT COALESCE(MAX(sort_order) + 1, 0) FROM classes", [], |r| {
            r.get(0)
        }) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, grade, homeroom_teacher_id, sort_order) VALUES(?, ?, ?, ?, ?)",
        (&class_id, &name, &grade, &homeroom, next_order),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(&req.id, json!({ "classId": class_id, "name": name }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match get_required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Dependency order; there is no ON DELETE CASCADE.
    for (table, sql) in [
        (
            "timetable_slots",
            "DELETE FROM timetable_slots WHERE class_id = ?",
        ),
        (
            "teacher_assignments",
            "DELETE FROM teacher_assignments WHERE class_id = ?",
        ),
        ("classes", "DELETE FROM classes WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&class_id]) {
            let _ = tx.rollback();
            return HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": table }))
                .response(&req.id);
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    log::info!("class {} deleted", class_id);
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
