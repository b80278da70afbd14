//! Session store: the registered user collection, the current identity, and
//! their persisted copies in the workspace `settings` table.
//!
//! Two storage keys are used. `users` holds every [`UserRecord`] as a JSON
//! array and `currentUser` holds the signed-in [`UserProfile`]. Mutations
//! write both inside one SQLite transaction and only touch the in-memory
//! session after the commit succeeded.

use crate::db;
use chrono::{SecondsFormat, Utc};
use lazy_static::lazy_static;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use uuid::Uuid;

pub const USERS_KEY: &str = "users";
pub const CURRENT_USER_KEY: &str = "currentUser";

const PASSWORD_SYMBOLS: &str = "!@#$%^&*";

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    Validation { field: &'static str, message: String },
    DuplicateEmail,
    InvalidCredentials,
    AccountInactive,
    NotFound,
    NotReady,
    Storage(String),
}

impl AuthError {
    fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::DuplicateEmail => "duplicate_email",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountInactive => "account_inactive",
            Self::NotFound => "not_found",
            Self::NotReady => "not_ready",
            Self::Storage(_) => "storage_error",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { field, .. } => Some(json!({ "field": field })),
            _ => None,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message, .. } => f.write_str(message),
            Self::DuplicateEmail => f.write_str("User with this email already exists"),
            Self::InvalidCredentials => f.write_str("Invalid email or password"),
            Self::AccountInactive => f.write_str("This account is not active"),
            Self::NotFound => f.write_str("User not found"),
            Self::NotReady => f.write_str("Session is still loading"),
            // The underlying cause is logged where the error is created.
            Self::Storage(_) => f.write_str("Unable to access saved account data"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<anyhow::Error> for AuthError {
    fn from(e: anyhow::Error) -> Self {
        log::error!("session storage failure: {e:#}");
        Self::Storage(e.to_string())
    }
}

impl From<rusqlite::Error> for AuthError {
    fn from(e: rusqlite::Error) -> Self {
        log::error!("session storage failure: {e}");
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        log::error!("session storage holds unreadable data: {e}");
        Self::Storage(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub year: String,
    pub class_name: String,
    pub roll_number: String,
    pub created_at: String,
    pub last_login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub account_status: AccountStatus,
}

/// A [`UserRecord`] without credentials; the only shape that leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub year: String,
    pub class_name: String,
    pub roll_number: String,
    pub created_at: String,
    pub last_login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub account_status: AccountStatus,
}

impl UserRecord {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            department: self.department.clone(),
            year: self.year.clone(),
            class_name: self.class_name.clone(),
            roll_number: self.roll_number.clone(),
            created_at: self.created_at.clone(),
            last_login: self.last_login.clone(),
            updated_at: self.updated_at.clone(),
            account_status: self.account_status,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub department: String,
    pub year: String,
    pub class_name: String,
    pub roll_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
    pub class_name: Option<String>,
    pub roll_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_digit_and_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 1,
            require_digit_and_symbol: false,
        }
    }
}

impl PasswordPolicy {
    fn check(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.min_length {
            return Err(AuthError::validation(
                "password",
                format!("Password must be at least {} characters", self.min_length),
            ));
        }
        if self.require_digit_and_symbol {
            let has_digit = password.chars().any(|c| c.is_ascii_digit());
            let has_symbol = password.chars().any(|c| PASSWORD_SYMBOLS.contains(c));
            if !has_digit || !has_symbol {
                return Err(AuthError::validation(
                    "password",
                    "Password must include numbers and symbols",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Loading,
    Unauthenticated,
    Authenticated,
}

/// The current identity. Starts in [`SessionPhase::Loading`] and leaves it
/// exactly once, when [`SessionStore::init`] has read the persisted session.
#[derive(Debug, Default)]
pub struct SessionStore {
    loaded: bool,
    current: Option<UserProfile>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.loaded, &self.current) {
            (false, _) => SessionPhase::Loading,
            (true, None) => SessionPhase::Unauthenticated,
            (true, Some(_)) => SessionPhase::Authenticated,
        }
    }

    pub fn current(&self) -> Option<&UserProfile> {
        self.current.as_ref()
    }

    pub fn init(&mut self, conn: &Connection) -> Result<SessionPhase, AuthError> {
        if self.loaded {
            return Ok(self.phase());
        }
        self.current = match db::settings_get_json(conn, CURRENT_USER_KEY)? {
            Some(raw) => match serde_json::from_value::<UserProfile>(raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    log::warn!("ignoring unreadable persisted session: {e}");
                    None
                }
            },
            None => None,
        };
        self.loaded = true;
        log::info!("session store ready: {:?}", self.phase());
        Ok(self.phase())
    }

    fn ensure_ready(&self) -> Result<(), AuthError> {
        if self.loaded {
            Ok(())
        } else {
            Err(AuthError::NotReady)
        }
    }

    pub fn register(
        &mut self,
        conn: &Connection,
        policy: &PasswordPolicy,
        details: RegisterDetails,
    ) -> Result<UserProfile, AuthError> {
        self.ensure_ready()?;

        let first_name = required(&details.first_name, "firstName", "First name")?;
        let last_name = required(&details.last_name, "lastName", "Last name")?;
        let department = required(&details.department, "department", "Department")?;
        let year = required(&details.year, "year", "Year")?;
        let class_name = required(&details.class_name, "className", "Class")?;
        let roll_number = required(&details.roll_number, "rollNumber", "Roll number")?;
        let email = normalize_email(&details.email)?;
        if details.password.is_empty() {
            return Err(AuthError::validation("password", "Password is required"));
        }
        if details.password != details.confirm_password {
            return Err(AuthError::validation(
                "confirmPassword",
                "Passwords do not match",
            ));
        }
        policy.check(&details.password)?;

        let mut users = load_users(conn)?;
        if users.iter().any(|u| u.email.to_lowercase() == email) {
            return Err(AuthError::DuplicateEmail);
        }

        let now = now_iso();
        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash: hash_password(&details.password)?,
            name: full_name(&first_name, &last_name),
            first_name,
            last_name,
            department,
            year,
            class_name,
            roll_number,
            created_at: now.clone(),
            last_login: now,
            updated_at: None,
            account_status: AccountStatus::Active,
        };
        let profile = record.profile();
        users.push(record);

        persist(conn, &users, Some(&profile))?;
        log::info!("registered user {}", profile.id);
        self.current = Some(profile.clone());
        Ok(profile)
    }

    pub fn login(
        &mut self,
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, AuthError> {
        self.ensure_ready()?;

        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AuthError::validation("email", "Email is required"));
        }
        if password.is_empty() {
            return Err(AuthError::validation("password", "Password is required"));
        }

        let mut users = load_users(conn)?;
        let Some(idx) = users.iter().position(|u| u.email.to_lowercase() == email) else {
            log::debug!("login rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &users[idx].password_hash) {
            log::debug!("login rejected: password mismatch for {}", users[idx].id);
            return Err(AuthError::InvalidCredentials);
        }
        if users[idx].account_status != AccountStatus::Active {
            return Err(AuthError::AccountInactive);
        }

        users[idx].last_login = now_iso();
        let profile = users[idx].profile();
        persist(conn, &users, Some(&profile))?;
        log::info!("user {} logged in", profile.id);
        self.current = Some(profile.clone());
        Ok(profile)
    }

    pub fn logout(&mut self, conn: &Connection) -> Result<(), AuthError> {
        db::settings_delete(conn, CURRENT_USER_KEY)?;
        if let Some(prev) = self.current.take() {
            log::info!("user {} logged out", prev.id);
        }
        Ok(())
    }

    pub fn update_profile(
        &mut self,
        conn: &Connection,
        user_id: &str,
        patch: ProfilePatch,
    ) -> Result<UserProfile, AuthError> {
        self.ensure_ready()?;

        let mut users = load_users(conn)?;
        let Some(idx) = users.iter().position(|u| u.id == user_id) else {
            return Err(AuthError::NotFound);
        };

        let email = match patch.email.as_deref() {
            Some(raw) => {
                let email = normalize_email(raw)?;
                let taken = users
                    .iter()
                    .enumerate()
                    .any(|(i, u)| i != idx && u.email.to_lowercase() == email);
                if taken {
                    return Err(AuthError::DuplicateEmail);
                }
                Some(email)
            }
            None => None,
        };
        let first_name = optional(patch.first_name.as_deref(), "firstName", "First name")?;
        let last_name = optional(patch.last_name.as_deref(), "lastName", "Last name")?;
        let department = optional(patch.department.as_deref(), "department", "Department")?;
        let year = optional(patch.year.as_deref(), "year", "Year")?;
        let class_name = optional(patch.class_name.as_deref(), "className", "Class")?;
        let roll_number = optional(patch.roll_number.as_deref(), "rollNumber", "Roll number")?;

        let record = &mut users[idx];
        if let Some(v) = email {
            record.email = v;
        }
        if let Some(v) = first_name {
            record.first_name = v;
        }
        if let Some(v) = last_name {
            record.last_name = v;
        }
        if let Some(v) = department {
            record.department = v;
        }
        if let Some(v) = year {
            record.year = v;
        }
        if let Some(v) = class_name {
            record.class_name = v;
        }
        if let Some(v) = roll_number {
            record.roll_number = v;
        }
        record.name = full_name(&record.first_name, &record.last_name);
        record.updated_at = Some(now_iso());
        let profile = record.profile();

        let is_current = self
            .current
            .as_ref()
            .map(|c| c.id == user_id)
            .unwrap_or(false);
        persist(conn, &users, is_current.then_some(&profile))?;
        if is_current {
            self.current = Some(profile.clone());
        }
        Ok(profile)
    }
}

pub fn load_profile(conn: &Connection, user_id: &str) -> Result<UserProfile, AuthError> {
    load_users(conn)?
        .iter()
        .find(|u| u.id == user_id)
        .map(UserRecord::profile)
        .ok_or(AuthError::NotFound)
}

fn load_users(conn: &Connection) -> Result<Vec<UserRecord>, AuthError> {
    match db::settings_get_json(conn, USERS_KEY)? {
        Some(raw) => Ok(serde_json::from_value(raw)?),
        None => Ok(Vec::new()),
    }
}

/// Writes the collection and, when given, the current-session slot in one
/// transaction.
fn persist(
    conn: &Connection,
    users: &[UserRecord],
    current: Option<&UserProfile>,
) -> Result<(), AuthError> {
    let tx = conn.unchecked_transaction()?;
    db::settings_set_json(&tx, USERS_KEY, &serde_json::to_value(users)?)?;
    if let Some(profile) = current {
        db::settings_set_json(&tx, CURRENT_USER_KEY, &serde_json::to_value(profile)?)?;
    }
    tx.commit()?;
    Ok(())
}

fn required(value: &str, field: &'static str, label: &str) -> Result<String, AuthError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AuthError::validation(field, format!("{} is required", label)));
    }
    Ok(v.to_string())
}

fn optional(
    value: Option<&str>,
    field: &'static str,
    label: &str,
) -> Result<Option<String>, AuthError> {
    value.map(|v| required(v, field, label)).transpose()
}

fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(AuthError::validation("email", "Email is required"));
    }
    if !EMAIL_RE.is_match(&email) {
        return Err(AuthError::validation("email", "Invalid email format"));
    }
    Ok(email)
}

fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first, last)
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Pbkdf2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            log::error!("password hashing failed: {e}");
            AuthError::Storage(e.to_string())
        })
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(hash) => Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok(),
        Err(e) => {
            log::warn!("stored password hash is malformed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_store(conn: &Connection) -> SessionStore {
        let mut store = SessionStore::new();
        store.init(conn).expect("init session");
        store
    }

    fn details(email: &str, password: &str) -> RegisterDetails {
        RegisterDetails {
            first_name: "A".into(),
            last_name: "B".into(),
            email: email.into(),
            password: password.into(),
            confirm_password: password.into(),
            department: "CS".into(),
            year: "FE".into(),
            class_name: "A".into(),
            roll_number: "1".into(),
        }
    }

    #[test]
    fn register_then_login_with_different_case() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);

        let profile = store
            .register(&conn, &PasswordPolicy::default(), details("a@x.com", "p1"))
            .expect("register");
        assert_eq!(profile.name, "A B");
        assert_eq!(profile.email, "a@x.com");
        let as_json = serde_json::to_value(&profile).expect("serialize");
        assert!(as_json.get("password").is_none());
        assert!(as_json.get("passwordHash").is_none());

        let stored = load_users(&conn).expect("users");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "A B");
        assert_ne!(stored[0].password_hash, "p1");

        store.logout(&conn).expect("logout");
        let logged_in = store.login(&conn, "A@X.com", "p1").expect("login");
        assert_eq!(logged_in.id, profile.id);
        assert_eq!(store.phase(), SessionPhase::Authenticated);
    }

    #[test]
    fn duplicate_email_is_rejected_case_insensitively() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);
        let policy = PasswordPolicy::default();
        store
            .register(&conn, &policy, details("dup@x.com", "first"))
            .expect("first register");
        let before = load_users(&conn).expect("users");

        let err = store
            .register(&conn, &policy, details("DUP@x.com", "second"))
            .expect_err("second register");
        assert_eq!(err, AuthError::DuplicateEmail);
        assert_eq!(load_users(&conn).expect("users"), before);
    }

    #[test]
    fn wrong_password_mutates_nothing() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);
        store
            .register(&conn, &PasswordPolicy::default(), details("w@x.com", "right"))
            .expect("register");
        store.logout(&conn).expect("logout");
        let before = load_users(&conn).expect("users");

        let err = store.login(&conn, "w@x.com", "wrong").expect_err("login");
        assert_eq!(err, AuthError::InvalidCredentials);
        let unknown = store.login(&conn, "nobody@x.com", "right").expect_err("login");
        assert_eq!(unknown, AuthError::InvalidCredentials);
        assert_eq!(err.to_string(), unknown.to_string());

        assert_eq!(load_users(&conn).expect("users"), before);
        assert_eq!(store.phase(), SessionPhase::Unauthenticated);
        assert_eq!(db::settings_get_json(&conn, CURRENT_USER_KEY).expect("get"), None);
    }

    #[test]
    fn blank_login_fields_are_named() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);

        match store.login(&conn, "a@x.com", "").expect_err("no password") {
            AuthError::Validation { field, .. } => assert_eq!(field, "password"),
            other => panic!("unexpected {other:?}"),
        }
        match store.login(&conn, "   ", "p1").expect_err("no email") {
            AuthError::Validation { field, .. } => assert_eq!(field, "email"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.phase(), SessionPhase::Unauthenticated);
    }

    #[test]
    fn logout_clears_memory_and_storage() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);
        store
            .register(&conn, &PasswordPolicy::default(), details("l@x.com", "pw"))
            .expect("register");
        assert!(db::settings_get_json(&conn, CURRENT_USER_KEY)
            .expect("get")
            .is_some());

        store.logout(&conn).expect("logout");
        assert_eq!(store.phase(), SessionPhase::Unauthenticated);
        assert!(store.current().is_none());
        assert_eq!(db::settings_get_json(&conn, CURRENT_USER_KEY).expect("get"), None);
    }

    #[test]
    fn init_restores_persisted_session_once() {
        let conn = db::open_in_memory().expect("db");
        let mut first = ready_store(&conn);
        let profile = first
            .register(&conn, &PasswordPolicy::default(), details("r@x.com", "pw"))
            .expect("register");

        let mut second = SessionStore::new();
        assert_eq!(second.phase(), SessionPhase::Loading);
        assert_eq!(
            second.login(&conn, "r@x.com", "pw").expect_err("not ready"),
            AuthError::NotReady
        );
        assert_eq!(second.init(&conn).expect("init"), SessionPhase::Authenticated);
        assert_eq!(second.current(), Some(&profile));

        db::settings_delete(&conn, CURRENT_USER_KEY).expect("delete");
        assert_eq!(second.init(&conn).expect("init again"), SessionPhase::Authenticated);
    }

    #[test]
    fn register_validation_errors_name_the_field() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);
        let policy = PasswordPolicy::default();

        let mut d = details("v@x.com", "pw");
        d.confirm_password = "other".into();
        match store.register(&conn, &policy, d).expect_err("mismatch") {
            AuthError::Validation { field, .. } => assert_eq!(field, "confirmPassword"),
            other => panic!("unexpected {other:?}"),
        }

        let d = details("not-an-email", "pw");
        match store.register(&conn, &policy, d).expect_err("bad email") {
            AuthError::Validation { field, .. } => assert_eq!(field, "email"),
            other => panic!("unexpected {other:?}"),
        }

        let mut d = details("v@x.com", "pw");
        d.roll_number = "   ".into();
        match store.register(&conn, &policy, d).expect_err("blank roll") {
            AuthError::Validation { field, .. } => assert_eq!(field, "rollNumber"),
            other => panic!("unexpected {other:?}"),
        }

        assert!(load_users(&conn).expect("users").is_empty());
        assert_eq!(store.phase(), SessionPhase::Unauthenticated);
    }

    #[test]
    fn strict_policy_requires_digit_and_symbol() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);
        let policy = PasswordPolicy {
            min_length: 8,
            require_digit_and_symbol: true,
        };
        assert!(store
            .register(&conn, &policy, details("s@x.com", "short1!"))
            .is_err());
        assert!(store
            .register(&conn, &policy, details("s@x.com", "longenough"))
            .is_err());
        store
            .register(&conn, &policy, details("s@x.com", "longenough1!"))
            .expect("strong password");
    }

    #[test]
    fn suspended_account_cannot_login() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);
        store
            .register(&conn, &PasswordPolicy::default(), details("x@x.com", "pw"))
            .expect("register");
        store.logout(&conn).expect("logout");

        let mut users = load_users(&conn).expect("users");
        users[0].account_status = AccountStatus::Suspended;
        persist(&conn, &users, None).expect("persist");

        assert_eq!(
            store.login(&conn, "x@x.com", "pw").expect_err("suspended"),
            AuthError::AccountInactive
        );
        assert_eq!(
            store.login(&conn, "x@x.com", "nope").expect_err("wrong pw"),
            AuthError::InvalidCredentials
        );
    }

    #[test]
    fn update_profile_merges_only_patched_fields() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);
        let created = store
            .register(&conn, &PasswordPolicy::default(), details("u@x.com", "pw"))
            .expect("register");

        let patch = ProfilePatch {
            first_name: Some("Zed".into()),
            department: Some("IT".into()),
            ..ProfilePatch::default()
        };
        let updated = store
            .update_profile(&conn, &created.id, patch)
            .expect("update");
        assert_eq!(updated.first_name, "Zed");
        assert_eq!(updated.department, "IT");
        assert_eq!(updated.name, "Zed B");
        assert_eq!(updated.last_name, created.last_name);
        assert_eq!(updated.email, created.email);
        assert_eq!(updated.year, created.year);
        assert_eq!(updated.class_name, created.class_name);
        assert_eq!(updated.roll_number, created.roll_number);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at.is_some());

        assert_eq!(load_profile(&conn, &created.id).expect("reload"), updated);
        assert_eq!(store.current(), Some(&updated));
        let persisted: UserProfile = serde_json::from_value(
            db::settings_get_json(&conn, CURRENT_USER_KEY)
                .expect("get")
                .expect("present"),
        )
        .expect("decode");
        assert_eq!(persisted, updated);
    }

    #[test]
    fn update_profile_rejects_unknown_user_and_taken_email() {
        let conn = db::open_in_memory().expect("db");
        let mut store = ready_store(&conn);
        let policy = PasswordPolicy::default();
        let first = store
            .register(&conn, &policy, details("one@x.com", "pw"))
            .expect("first");
        store
            .register(&conn, &policy, details("two@x.com", "pw"))
            .expect("second");

        assert_eq!(
            store
                .update_profile(&conn, "missing", ProfilePatch::default())
                .expect_err("missing"),
            AuthError::NotFound
        );
        let patch = ProfilePatch {
            email: Some("TWO@x.com".into()),
            ..ProfilePatch::default()
        };
        assert_eq!(
            store
                .update_profile(&conn, &first.id, patch)
                .expect_err("taken"),
            AuthError::DuplicateEmail
        );
        assert_eq!(load_profile(&conn, &first.id).expect("reload").email, "one@x.com");
    }

    #[test]
    fn profile_patch_rejects_password_field() {
        let raw = json!({ "firstName": "X", "password": "sneaky" });
        assert!(serde_json::from_value::<ProfilePatch>(raw).is_err());
    }
}
