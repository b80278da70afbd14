use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use uuid::Uuid;

pub const DAY_CODES: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];
pub const ENTRY_TYPES: [&str; 4] = ["LECTURE", "LAB", "TUTORIAL", "SEMINAR"];

const SELECT_COLUMNS: &str = "id, class_name, day, start_time, end_time, subject, faculty, room,
     type, department, year, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimetableError {
    Validation {
        field: &'static str,
        message: String,
    },
    NotFound,
    Storage(String),
}

impl TimetableError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound => "not_found",
            Self::Storage(_) => "storage_error",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { field, .. } => Some(json!({ "field": field })),
            _ => None,
        }
    }

    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for TimetableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message, .. } => f.write_str(message),
            Self::NotFound => f.write_str("timetable entry not found"),
            Self::Storage(_) => f.write_str("timetable storage is unavailable"),
        }
    }
}

impl std::error::Error for TimetableError {}

impl From<rusqlite::Error> for TimetableError {
    fn from(e: rusqlite::Error) -> Self {
        log::error!("timetable query failed: {e}");
        Self::Storage(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub id: String,
    pub class_name: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub subject: String,
    pub faculty: String,
    pub room: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub department: String,
    pub year: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl TimetableEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            class_name: row.get(1)?,
            day: row.get(2)?,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
            subject: row.get(5)?,
            faculty: row.get(6)?,
            room: row.get(7)?,
            entry_type: row.get(8)?,
            department: row.get(9)?,
            year: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct NewEntry {
    pub class_name: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub subject: String,
    pub faculty: String,
    pub room: String,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub department: String,
    pub year: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntryPatch {
    pub class_name: Option<String>,
    pub day: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub subject: Option<String>,
    pub faculty: Option<String>,
    pub room: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFilter {
    pub day: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
}

impl EntryFilter {
    fn matches(&self, e: &TimetableEntry) -> bool {
        self.day.as_deref().map_or(true, |d| e.day == d)
            && self
                .department
                .as_deref()
                .map_or(true, |d| e.department.eq_ignore_ascii_case(d))
            && self
                .year
                .as_deref()
                .map_or(true, |y| e.year.eq_ignore_ascii_case(y))
    }
}

/// `MON`..`SUN`; also accepts full and three-letter English names.
pub fn parse_day(s: &str) -> Result<&'static str, TimetableError> {
    s.trim()
        .parse::<Weekday>()
        .map(day_code)
        .map_err(|_| TimetableError::invalid("day", format!("unknown day {:?}", s)))
}

pub fn day_code(w: Weekday) -> &'static str {
    DAY_CODES[w.num_days_from_monday() as usize]
}

fn day_rank(code: &str) -> usize {
    DAY_CODES
        .iter()
        .position(|d| *d == code)
        .unwrap_or(DAY_CODES.len())
}

/// Normalises `H:MM`, `HH:MM` or `HH:MM:SS` to `HH:MM`.
pub fn parse_time(field: &'static str, s: &str) -> Result<String, TimetableError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| TimetableError::invalid(field, format!("{} must be HH:MM", field)))
}

fn parse_type(s: &str) -> Result<String, TimetableError> {
    let upper = s.trim().to_ascii_uppercase();
    if ENTRY_TYPES.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(TimetableError::invalid(
            "type",
            format!("type must be one of {}", ENTRY_TYPES.join(", ")),
        ))
    }
}

fn required(field: &'static str, v: &str) -> Result<String, TimetableError> {
    let v = v.trim();
    if v.is_empty() {
        return Err(TimetableError::invalid(field, format!("{} is required", field)));
    }
    Ok(v.to_string())
}

fn check_span(start: &str, end: &str) -> Result<(), TimetableError> {
    // Both sides are normalised HH:MM, so string order is time order.
    if end <= start {
        return Err(TimetableError::invalid(
            "endTime",
            "endTime must be after startTime",
        ));
    }
    Ok(())
}

fn sort_entries(entries: &mut [TimetableEntry]) {
    entries.sort_by(|a, b| {
        day_rank(&a.day)
            .cmp(&day_rank(&b.day))
            .then_with(|| a.start_time.cmp(&b.start_time))
            .then_with(|| a.class_name.cmp(&b.class_name))
    });
}

fn all_entries(conn: &Connection) -> Result<Vec<TimetableEntry>, TimetableError> {
    let sql = format!("SELECT {} FROM timetable_entries", SELECT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut entries = stmt
        .query_map([], TimetableEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    sort_entries(&mut entries);
    Ok(entries)
}

pub fn list(conn: &Connection, filter: &EntryFilter) -> Result<Vec<TimetableEntry>, TimetableError> {
    let filter = EntryFilter {
        day: filter.day.as_deref().map(parse_day).transpose()?.map(String::from),
        ..filter.clone()
    };
    Ok(all_entries(conn)?
        .into_iter()
        .filter(|e| filter.matches(e))
        .collect())
}

/// Entries for the weekday `date` falls on.
pub fn daily(
    conn: &Connection,
    date: NaiveDate,
    filter: &EntryFilter,
) -> Result<(&'static str, Vec<TimetableEntry>), TimetableError> {
    let day = day_code(date.weekday());
    let filter = EntryFilter {
        day: Some(day.to_string()),
        ..filter.clone()
    };
    Ok((day, list(conn, &filter)?))
}

/// Every weekday with its entries, Monday first. Days without entries are
/// kept so the week always has seven buckets.
pub fn weekly(
    conn: &Connection,
    filter: &EntryFilter,
) -> Result<Vec<(&'static str, Vec<TimetableEntry>)>, TimetableError> {
    let filter = EntryFilter {
        day: None,
        ..filter.clone()
    };
    let entries = list(conn, &filter)?;
    Ok(DAY_CODES
        .iter()
        .map(|d| {
            let day_entries = entries.iter().filter(|e| e.day == *d).cloned().collect();
            (*d, day_entries)
        })
        .collect())
}

pub fn get(conn: &Connection, id: &str) -> Result<TimetableEntry, TimetableError> {
    let sql = format!("SELECT {} FROM timetable_entries WHERE id = ?", SELECT_COLUMNS);
    conn.query_row(&sql, [id], TimetableEntry::from_row)
        .optional()?
        .ok_or(TimetableError::NotFound)
}

pub fn create(conn: &Connection, new: NewEntry) -> Result<TimetableEntry, TimetableError> {
    let start_time = parse_time("startTime", &new.start_time)?;
    let end_time = parse_time("endTime", &new.end_time)?;
    check_span(&start_time, &end_time)?;
    let entry = TimetableEntry {
        id: Uuid::new_v4().to_string(),
        class_name: required("className", &new.class_name)?,
        day: parse_day(&new.day)?.to_string(),
        start_time,
        end_time,
        subject: required("subject", &new.subject)?,
        faculty: required("faculty", &new.faculty)?,
        room: required("room", &new.room)?,
        entry_type: match new.entry_type.as_deref() {
            Some(t) => parse_type(t)?,
            None => ENTRY_TYPES[0].to_string(),
        },
        department: required("department", &new.department)?,
        year: required("year", &new.year)?,
        created_at: now_iso(),
        updated_at: None,
    };
    conn.execute(
        "INSERT INTO timetable_entries(id, class_name, day, start_time, end_time, subject,
            faculty, room, type, department, year, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            entry.id,
            entry.class_name,
            entry.day,
            entry.start_time,
            entry.end_time,
            entry.subject,
            entry.faculty,
            entry.room,
            entry.entry_type,
            entry.department,
            entry.year,
            entry.created_at,
        ],
    )?;
    log::info!("timetable entry {} created for {}", entry.id, entry.day);
    Ok(entry)
}

pub fn update(
    conn: &Connection,
    id: &str,
    patch: EntryPatch,
) -> Result<TimetableEntry, TimetableError> {
    let mut e = get(conn, id)?;
    if let Some(v) = patch.class_name {
        e.class_name = required("className", &v)?;
    }
    if let Some(v) = patch.day {
        e.day = parse_day(&v)?.to_string();
    }
    if let Some(v) = patch.start_time {
        e.start_time = parse_time("startTime", &v)?;
    }
    if let Some(v) = patch.end_time {
        e.end_time = parse_time("endTime", &v)?;
    }
    check_span(&e.start_time, &e.end_time)?;
    if let Some(v) = patch.subject {
        e.subject = required("subject", &v)?;
    }
    if let Some(v) = patch.faculty {
        e.faculty = required("faculty", &v)?;
    }
    if let Some(v) = patch.room {
        e.room = required("room", &v)?;
    }
    if let Some(v) = patch.entry_type {
        e.entry_type = parse_type(&v)?;
    }
    if let Some(v) = patch.department {
        e.department = required("department", &v)?;
    }
    if let Some(v) = patch.year {
        e.year = required("year", &v)?;
    }
    e.updated_at = Some(now_iso());

    conn.execute(
        "UPDATE timetable_entries
         SET class_name = ?, day = ?, start_time = ?, end_time = ?, subject = ?, faculty = ?,
             room = ?, type = ?, department = ?, year = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            e.class_name,
            e.day,
            e.start_time,
            e.end_time,
            e.subject,
            e.faculty,
            e.room,
            e.entry_type,
            e.department,
            e.year,
            e.updated_at,
            e.id,
        ],
    )?;
    Ok(e)
}

pub fn delete(conn: &Connection, id: &str) -> Result<(), TimetableError> {
    let n = conn.execute("DELETE FROM timetable_entries WHERE id = ?", [id])?;
    if n == 0 {
        return Err(TimetableError::NotFound);
    }
    log::info!("timetable entry {} deleted", id);
    Ok(())
}

/// First entry on `day` that starts strictly after `time`.
pub fn next_class(
    conn: &Connection,
    day: &str,
    time: &str,
) -> Result<Option<TimetableEntry>, TimetableError> {
    let time = parse_time("time", time)?;
    let filter = EntryFilter {
        day: Some(day.to_string()),
        ..EntryFilter::default()
    };
    Ok(list(conn, &filter)?
        .into_iter()
        .find(|e| e.start_time > time))
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
