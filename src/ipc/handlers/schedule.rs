use crate::ipc::error::ok;
use crate::ipc::helpers::{optional_str, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{
    color_for, CellEditor, CellKey, EntryKind, LessonDetails, Progress, Schedule, ScheduleEntry,
    WizardInput, WizardStep,
};
use serde_json::{json, Value};

/// Resolves a day or slot given either as an index or as one of its labels.
fn cell_index(
    params: &Value,
    key: &str,
    by_label: impl Fn(&str) -> Option<usize>,
) -> Result<usize, HandlerErr> {
    match params.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-negative index", key))),
        Some(Value::String(s)) => by_label(s).ok_or_else(|| {
            HandlerErr::new("validation_error", format!("unknown {}: {}", key, s))
        }),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

fn entry_json(schedule: &Schedule, key: CellKey, entry: &ScheduleEntry) -> Value {
    let layout = schedule.layout();
    let mut v = json!(entry);
    v["day"] = json!(key.day);
    v["slot"] = json!(key.slot);
    v["dayLabel"] = json!(layout.days.get(key.day));
    v["time"] = json!(layout.slots.get(key.slot));
    v["color"] = json!(entry.color());
    v
}

fn grid_view(schedule: &Schedule) -> Value {
    let layout = schedule.layout();
    let rows: Vec<Value> = layout
        .slots
        .iter()
        .enumerate()
        .map(|(slot, label)| {
            let cells: Vec<Value> = (0..layout.days.len())
                .map(|day| match schedule.get(day, slot) {
                    Some(entry) => entry_json(schedule, CellKey { day, slot }, entry),
                    None => Value::Null,
                })
                .collect();
            json!({
                "slot": slot,
                "time": label,
                "isLunch": layout.is_lunch(slot),
                "cells": cells,
            })
        })
        .collect();
    json!({
        "view": "grid",
        "days": layout.days,
        "slots": layout.slots,
        "lunchSlot": layout.lunch_slot,
        "rows": rows,
    })
}

fn list_view(schedule: &Schedule) -> Value {
    let layout = schedule.layout();
    let days: Vec<Value> = layout
        .days
        .iter()
        .enumerate()
        .map(|(day, label)| {
            let entries: Vec<Value> = schedule
                .cells()
                .filter(|(k, _)| k.day == day)
                .map(|(k, e)| entry_json(schedule, *k, e))
                .collect();
            json!({ "day": day, "label": label, "entries": entries })
        })
        .collect();
    json!({
        "view": "list",
        "lunchSlot": layout.lunch_slot,
        "days": days,
    })
}

fn wizard_view(state: &AppState) -> Value {
    match state.editor.as_ref() {
        Some(ed) => {
            let layout = state.schedule.layout();
            json!({
                "open": true,
                "day": ed.day(),
                "slot": ed.slot(),
                "dayLabel": layout.days.get(ed.day()),
                "time": layout.slots.get(ed.slot()),
                "step": ed.step(),
                "start": ed.start(),
                "group": ed.pending_group(),
            })
        }
        None => json!({ "open": false }),
    }
}

fn schedule_activate(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let layout = state.schedule.layout();
    let day = cell_index(params, "day", |s| layout.day_index(s))?;
    let slot = cell_index(params, "slot", |s| layout.slot_index(s))?;
    // A rejected activation leaves any previous wizard alone.
    let editor = CellEditor::open(&state.schedule, day, slot)?;
    state.editor = Some(editor);
    Ok(wizard_view(state))
}

fn details_input(params: &Value) -> Result<WizardInput, HandlerErr> {
    let field = |k: &str| optional_str(params, k).map(|v| v.unwrap_or_default());
    let details = LessonDetails::new(&field("subject")?, &field("faculty")?, &field("room")?)?;
    Ok(WizardInput::Details(details))
}

fn parse_input(state: &AppState, editor: &CellEditor, params: &Value) -> Result<WizardInput, HandlerErr> {
    match editor.step() {
        WizardStep::Kind => {
            let raw = required_str(params, "kind")?;
            let kind = EntryKind::parse(&raw).ok_or_else(|| {
                HandlerErr::new("validation_error", "kind must be lecture or practical")
            })?;
            Ok(WizardInput::Kind(kind))
        }
        WizardStep::LectureDetails | WizardStep::PracticalDetails => details_input(params),
        WizardStep::PracticalStart => {
            let start = match params.get("start") {
                None | Some(Value::Null) => editor.slot(),
                Some(_) => cell_index(params, "start", |s| state.schedule.layout().slot_index(s))?,
            };
            Ok(WizardInput::Start(start))
        }
        WizardStep::PracticalSplit => params
            .get("split")
            .and_then(|v| v.as_bool())
            .map(WizardInput::Split)
            .ok_or_else(|| HandlerErr::bad_params("missing split")),
        WizardStep::Done => Err(HandlerErr::new("wrong_step", "the cell editor has finished")),
    }
}

fn schedule_submit(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let Some(mut editor) = state.editor.take() else {
        return Err(HandlerErr::new("wrong_step", "no cell editor is open"));
    };
    let input = match parse_input(state, &editor, params) {
        Ok(input) => input,
        Err(e) => {
            state.editor = Some(editor);
            return Err(e);
        }
    };

    let result = editor.submit(&mut state.schedule, input);
    let finished = editor.step() == WizardStep::Done;
    if !finished {
        state.editor = Some(editor);
    }
    match result? {
        Progress::Next(step) => Ok(json!({
            "status": "next",
            "step": step,
            "wizard": wizard_view(state),
        })),
        Progress::Committed(cells) => {
            log::info!("schedule commit: {} cell(s)", cells.len());
            let written: Vec<Value> = cells
                .iter()
                .filter_map(|k| {
                    state
                        .schedule
                        .get(k.day, k.slot)
                        .map(|e| entry_json(&state.schedule, *k, e))
                })
                .collect();
            Ok(json!({ "status": "committed", "cells": written }))
        }
    }
}

fn schedule_clear(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let layout = state.schedule.layout();
    let day = cell_index(params, "day", |s| layout.day_index(s))?;
    let slot = cell_index(params, "slot", |s| layout.slot_index(s))?;
    let removed = state.schedule.clear(day, slot)?;
    if !removed.is_empty() {
        log::info!("schedule clear: {} cell(s)", removed.len());
    }
    Ok(json!({ "removed": removed }))
}

fn schedule_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    match optional_str(params, "view")?.as_deref() {
        None | Some("grid") => Ok(grid_view(&state.schedule)),
        Some("list") => Ok(list_view(&state.schedule)),
        Some(other) => Err(HandlerErr::bad_params(format!("unknown view: {}", other))),
    }
}

fn schedule_color_for(params: &Value) -> Result<Value, HandlerErr> {
    let subject = required_str(params, "subject")?;
    let kind = match optional_str(params, "kind")? {
        None => EntryKind::Lecture,
        Some(raw) => EntryKind::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("kind must be lecture or practical"))?,
    };
    Ok(json!({ "color": color_for(&subject, kind) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "schedule.activate" => schedule_activate(state, &req.params),
        "schedule.submit" => schedule_submit(state, &req.params),
        "schedule.cancel" => {
            let was_open = state.editor.take().is_some();
            Ok(json!({ "cancelled": was_open }))
        }
        "schedule.wizard" => Ok(wizard_view(state)),
        "schedule.get" => schedule_get(state, &req.params),
        "schedule.clear" => schedule_clear(state, &req.params),
        "schedule.colorFor" => schedule_color_for(&req.params),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
