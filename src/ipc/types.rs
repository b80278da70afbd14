use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::schedule::{CellEditor, GridLayout, Schedule};
use crate::session::SessionStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: SessionStore,
    pub schedule: Schedule,
    /// Wizard opened by `schedule.activate`, if any.
    pub editor: Option<CellEditor>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            session: SessionStore::new(),
            schedule: Schedule::new(GridLayout::default()),
            editor: None,
        }
    }
}
