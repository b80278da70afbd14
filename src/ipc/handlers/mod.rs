pub mod auth;
pub mod core;
pub mod schedule;
pub mod setup;
pub mod timetable;
