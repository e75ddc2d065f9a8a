use crate::ipc::helpers::{db_query_err, get_optional_str, get_required_str, require_db, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn teachers_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "teachers": [] }));
    };
    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.name, t.email,
               (SELECT COUNT(*) FROM teacher_assignments a WHERE a.teacher_id = t.id)
             FROM teachers t
             ORDER BY t.name, t.id",
        )
        .map_err(db_query_err)?;
    let teachers = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "email": r.get::<_, Option<String>>(2)?,
                "assignmentCount": r.get::<_, i64>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_err)?;
    Ok(json!({ "teachers": teachers }))
}

fn teachers_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_required_str(&req.params, "name")?;
    let email = get_optional_str(&req.params, "email")?;
    if let Some(e) = email.as_deref() {
        if !e.contains('@') {
            return Err(HandlerErr::new("bad_params", "email must contain @"));
        }
    }

    let teacher_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, name, email) VALUES(?, ?, ?)",
        (&teacher_id, &name, &email),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "teachers" }))
    })?;
    Ok(json!({ "teacherId": teacher_id, "name": name }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(respond(&req.id, teachers_list(state))),
        "teachers.create" => Some(respond(&req.id, teachers_create(state, req))),
        _ => None,
    }
}
