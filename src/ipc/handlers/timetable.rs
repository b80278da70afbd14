use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, optional_str, parse_params, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::timetable::{self, EntryFilter, EntryPatch, NewEntry};
use chrono::NaiveDate;
use serde_json::{json, Value};

fn parse_date(params: &Value) -> Result<NaiveDate, HandlerErr> {
    match optional_str(params, "date")? {
        None => Ok(chrono::Local::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| HandlerErr {
            code: "validation_error",
            message: "date must be YYYY-MM-DD".to_string(),
            details: Some(json!({ "field": "date" })),
        }),
    }
}

fn timetable_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let filter: EntryFilter = parse_params(params, None)?;
    let entries = timetable::list(conn, &filter)?;
    Ok(json!({ "entries": entries }))
}

fn timetable_daily(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let date = parse_date(params)?;
    let filter = EntryFilter {
        day: None,
        department: optional_str(params, "department")?,
        year: optional_str(params, "year")?,
    };
    let (day, entries) = timetable::daily(conn, date, &filter)?;
    Ok(json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "day": day,
        "entries": entries,
    }))
}

fn timetable_weekly(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let filter: EntryFilter = parse_params(params, None)?;
    let days: Vec<Value> = timetable::weekly(conn, &filter)?
        .into_iter()
        .map(|(day, entries)| json!({ "day": day, "entries": entries }))
        .collect();
    Ok(json!({ "days": days }))
}

fn timetable_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let entry_id = required_str(params, "entryId")?;
    let entry = timetable::get(conn, &entry_id)?;
    Ok(json!({ "entry": entry }))
}

fn timetable_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let new: NewEntry = parse_params(params, None)?;
    let entry = timetable::create(conn, new)?;
    Ok(json!({ "entry": entry }))
}

fn timetable_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let entry_id = required_str(params, "entryId")?;
    let patch: EntryPatch = parse_params(params, Some("patch"))?;
    let entry = timetable::update(conn, &entry_id, patch)?;
    Ok(json!({ "entry": entry }))
}

fn timetable_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let entry_id = required_str(params, "entryId")?;
    timetable::delete(conn, &entry_id)?;
    Ok(json!({ "ok": true }))
}

fn timetable_next_class(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let day = required_str(params, "day")?;
    let time = required_str(params, "time")?;
    let entry = timetable::next_class(conn, &day, &time)?;
    Ok(json!({ "entry": entry }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "timetable.list" => timetable_list(state, &req.params),
        "timetable.daily" => timetable_daily(state, &req.params),
        "timetable.weekly" => timetable_weekly(state, &req.params),
        "timetable.get" => timetable_get(state, &req.params),
        "timetable.create" => timetable_create(state, &req.params),
        "timetable.update" => timetable_update(state, &req.params),
        "timetable.delete" => timetable_delete(state, &req.params),
        "timetable.nextClass" => timetable_next_class(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
