use crate::db;
use crate::ipc::helpers::{get_required_str, require_db, require_row, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::timetable::{self, TimetableError, Weekday};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

fn lookup_names(conn: &Connection, table: &str) -> Result<HashMap<String, String>, HandlerErr> {
    db::name_lookup(conn, table).map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))
}

fn slot_json(
    day: Weekday,
    period: i64,
    subject_id: Option<&str>,
    teacher_id: Option<&str>,
    subjects: &HashMap<String, String>,
    teachers: &HashMap<String, String>,
) -> serde_json::Value {
    json!({
        "day": day.as_str(),
        "period": period,
        "subjectId": subject_id,
        "subjectName": subject_id.and_then(|s| subjects.get(s)),
        "teacherId": teacher_id,
        "teacherName": teacher_id.and_then(|t| teachers.get(t)),
        "free": teacher_id.is_none(),
    })
}

fn timetable_generate(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let persist = match req.params.get("persist") {
        None | Some(serde_json::Value::Null) => false,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::new("bad_params", "persist must be a boolean"))?,
    };

    let inputs = db::load_timetable_inputs(conn).map_err(|e| {
        log::error!("timetable generation aborted: {}", e);
        let TimetableError::DataUnavailable { what, .. } = &e;
        HandlerErr::new("data_unavailable", e.to_string()).with_details(json!({ "what": what }))
    })?;

    let generated = timetable::generate(&inputs);
    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let subjects: HashMap<String, String> = inputs
        .subjects
        .iter()
        .map(|s| (s.id.clone(), s.name.clone()))
        .collect();
    let teachers = lookup_names(conn, "teachers")?;

    if persist {
        let written = db::save_timetable(conn, &generated, &generated_at).map_err(|e| {
            HandlerErr::new("db_insert_failed", format!("{e:#}"))
                .with_details(json!({ "table": "timetable_slots" }))
        })?;
        log::info!("timetable persisted: {} slots", written);
    }

    let class_names: HashMap<&str, &str> = inputs
        .classes
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let classes: Vec<serde_json::Value> = generated
        .classes
        .iter()
        .map(|c| {
            let slots: Vec<serde_json::Value> = c
                .slots
                .iter()
                .map(|s| {
                    slot_json(
                        s.day,
                        i64::from(s.period),
                        s.subject_id.as_deref(),
                        s.teacher_id.as_deref(),
                        &subjects,
                        &teachers,
                    )
                })
                .collect();
            json!({
                "classId": c.class_id,
                "className": class_names.get(c.class_id.as_str()),
                "slots": slots,
            })
        })
        .collect();

    let assigned_teachers: BTreeSet<&str> = inputs
        .assignments
        .iter()
        .filter_map(|a| a.teacher_id.as_deref())
        .collect();
    let teacher_loads: Vec<serde_json::Value> = assigned_teachers
        .into_iter()
        .map(|t| {
            json!({
                "teacherId": t,
                "teacherName": teachers.get(t),
                "periods": generated.teacher_view(t).len(),
            })
        })
        .collect();

    let free_periods = generated.free_period_count();
    log::info!(
        "timetable generated: {} classes, {} free periods, persisted={}",
        generated.classes.len(),
        free_periods,
        persist
    );

    Ok(json!({
        "generatedAt": generated_at,
        "daysPerWeek": Weekday::ALL.len(),
        "periodsPerDay": timetable::PERIODS_PER_DAY,
        "classes": classes,
        "teacherLoads": teacher_loads,
        "freePeriods": free_periods,
        "persisted": persist,
    }))
}

fn timetable_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    require_row(conn, "classes", &class_id, "class")?;

    let stored = db::load_saved_slots(conn, &class_id)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    let subjects = lookup_names(conn, "subjects")?;
    let teachers = lookup_names(conn, "teachers")?;

    let slots: Vec<serde_json::Value> = stored
        .iter()
        .map(|s| {
            slot_json(
                s.day,
                s.period,
                s.subject_id.as_deref(),
                s.teacher_id.as_deref(),
                &subjects,
                &teachers,
            )
        })
        .collect();
    Ok(json!({
        "classId": class_id,
        "generatedAt": stored.first().map(|s| s.generated_at.clone()),
        "slots": slots,
    }))
}

fn timetable_teacher(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let teacher_id = get_required_str(&req.params, "teacherId")?;
    require_row(conn, "teachers", &teacher_id, "teacher")?;

    let stored = db::load_saved_teacher_slots(conn, &teacher_id)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    let subjects = lookup_names(conn, "subjects")?;
    let classes = lookup_names(conn, "classes")?;

    let slots: Vec<serde_json::Value> = stored
        .iter()
        .map(|s| {
            json!({
                "day": s.day.as_str(),
                "period": s.period,
                "classId": s.class_id,
                "className": classes.get(&s.class_id),
                "subjectId": s.subject_id,
                "subjectName": s.subject_id.as_ref().and_then(|id| subjects.get(id)),
            })
        })
        .collect();
    Ok(json!({ "teacherId": teacher_id, "slots": slots }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.generate" => Some(respond(&req.id, timetable_generate(state, req))),
        "timetable.get" => Some(respond(&req.id, timetable_get(state, req))),
        "timetable.teacher" => Some(respond(&req.id, timetable_teacher(state, req))),
        _ => None,
    }
}
