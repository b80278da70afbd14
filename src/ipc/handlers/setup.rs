use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, optional_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{GridLayout, Schedule};
use crate::session::PasswordPolicy;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, PartialEq, Eq)]
enum SetupSection {
    Auth,
    Schedule,
    Preferences,
}

impl SetupSection {
    const ALL: [SetupSection; 3] = [Self::Auth, Self::Schedule, Self::Preferences];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "auth" => Some(Self::Auth),
            "schedule" => Some(Self::Schedule),
            "preferences" => Some(Self::Preferences),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Schedule => "schedule",
            Self::Preferences => "preferences",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Auth => "setup.auth",
            Self::Schedule => "setup.schedule",
            Self::Preferences => "setup.preferences",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Auth => {
            let policy = PasswordPolicy::default();
            json!({
                "minPasswordLength": policy.min_length,
                "requireDigitAndSymbol": policy.require_digit_and_symbol
            })
        }
        SetupSection::Schedule => json!(GridLayout::default()),
        SetupSection::Preferences => json!({
            "theme": "system",
            "reminderMinutes": 15,
            "emailNotifications": true,
            "pushNotifications": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_label_list(v: &Value, key: &str, max_len: usize) -> Result<Vec<Value>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let s = item
            .as_str()
            .ok_or_else(|| format!("{} must be an array of strings", key))?
            .trim();
        if s.is_empty() || s.len() > max_len {
            return Err(format!("{} labels must be 1..={} characters", key, max_len));
        }
        out.push(Value::String(s.to_string()));
    }
    Ok(out)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Auth => match k.as_str() {
                "minPasswordLength" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 128)?));
                }
                "requireDigitAndSymbol" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown auth field: {}", k)),
            },
            SetupSection::Schedule => match k.as_str() {
                "days" | "slots" => {
                    obj.insert(k.clone(), Value::Array(parse_label_list(v, k, 24)?));
                }
                "lunchSlot" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 47)?));
                }
                _ => return Err(format!("unknown schedule field: {}", k)),
            },
            SetupSection::Preferences => match k.as_str() {
                "theme" => {
                    let t = v
                        .as_str()
                        .ok_or_else(|| format!("{} must be string", k))?
                        .trim()
                        .to_ascii_lowercase();
                    if t != "light" && t != "dark" && t != "system" {
                        return Err("theme must be one of: light, dark, system".into());
                    }
                    obj.insert(k.clone(), Value::String(t));
                }
                "reminderMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 120)?));
                }
                "emailNotifications" | "pushNotifications" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown preferences field: {}", k)),
            },
        }
    }
    if section == SetupSection::Schedule {
        layout_from_value(current)?;
    }
    Ok(())
}

fn layout_from_value(v: &Value) -> Result<GridLayout, String> {
    let layout: GridLayout = serde_json::from_value(v.clone()).map_err(|e| e.to_string())?;
    layout.validate()?;
    Ok(layout)
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed stored values fall back to defaults.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            } else {
                log::warn!("ignoring invalid stored {} section", section.name());
            }
        }
    }
    Ok(current)
}

pub fn load_password_policy(conn: &Connection) -> anyhow::Result<PasswordPolicy> {
    let v = load_section(conn, SetupSection::Auth)?;
    let defaults = PasswordPolicy::default();
    Ok(PasswordPolicy {
        min_length: v["minPasswordLength"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(defaults.min_length),
        require_digit_and_symbol: v["requireDigitAndSymbol"]
            .as_bool()
            .unwrap_or(defaults.require_digit_and_symbol),
    })
}

pub fn load_grid_layout(conn: &Connection) -> anyhow::Result<GridLayout> {
    let v = load_section(conn, SetupSection::Schedule)?;
    Ok(layout_from_value(&v).unwrap_or_default())
}

fn setup_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let load = |section| {
        load_section(conn, section).map_err(|e| {
            log::error!("setup read failed: {e:?}");
            HandlerErr::new("storage_error", "workspace settings are unavailable")
        })
    };

    if let Some(raw) = optional_str(params, "section")? {
        let section = SetupSection::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
        return load(section);
    }
    let mut all = Map::new();
    for section in SetupSection::ALL {
        all.insert(section.name().to_string(), load(section)?);
    }
    Ok(Value::Object(all))
}

fn setup_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let section_raw = params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    let section =
        SetupSection::parse(section_raw).ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
    let patch_obj = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let mut current = load_section(conn, section).map_err(|e| {
        log::error!("setup read failed: {e:?}");
        HandlerErr::new("storage_error", "workspace settings are unavailable")
    })?;
    merge_section_patch(section, &mut current, patch_obj)
        .map_err(|msg| HandlerErr::new("validation_error", msg))?;

    let layout = match section {
        SetupSection::Schedule => {
            if !state.schedule.is_empty() {
                return Err(HandlerErr::new(
                    "conflict",
                    "clear the schedule before changing its layout",
                ));
            }
            Some(layout_from_value(&current).map_err(|msg| HandlerErr::new("validation_error", msg))?)
        }
        _ => None,
    };

    db::settings_set_json(conn, section.key(), &current).map_err(|e| {
        log::error!("setup write failed: {e:?}");
        HandlerErr::new("storage_error", "workspace settings are unavailable")
    })?;
    if let Some(layout) = layout {
        log::info!(
            "schedule grid rebuilt: {} days x {} slots",
            layout.days.len(),
            layout.slots.len()
        );
        state.schedule = Schedule::new(layout);
        state.editor = None;
    }
    Ok(current)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    match setup_get(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    match setup_update(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
