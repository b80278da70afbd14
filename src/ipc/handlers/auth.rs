use crate::ipc::error::ok;
use crate::ipc::handlers::setup::load_password_policy;
use crate::ipc::helpers::{db_conn, optional_str, parse_params, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::{self, ProfilePatch, RegisterDetails};
use serde_json::{json, Value};

fn session_view(state: &AppState) -> Value {
    json!({
        "phase": state.session.phase(),
        "user": state.session.current(),
    })
}

fn auth_register(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let details: RegisterDetails = parse_params(params, None)?;
    let policy = load_password_policy(conn).map_err(|e| {
        log::error!("failed to read password policy: {e:?}");
        HandlerErr::new("storage_error", "workspace settings are unavailable")
    })?;
    let user = state.session.register(conn, &policy, details)?;
    Ok(json!({ "user": user }))
}

fn auth_login(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let email = required_str(params, "email")?;
    let password = required_str(params, "password")?;
    let user = state.session.login(conn, &email, &password)?;
    Ok(json!({ "user": user }))
}

fn auth_logout(state: &mut AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    state.session.logout(conn)?;
    Ok(session_view(state))
}

fn target_user(state: &AppState, params: &Value) -> Result<String, HandlerErr> {
    match optional_str(params, "userId")? {
        Some(id) => Ok(id),
        None => state
            .session
            .current()
            .map(|u| u.id.clone())
            .ok_or_else(|| HandlerErr::bad_params("missing userId")),
    }
}

fn auth_get_profile(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let user_id = target_user(state, params)?;
    let user = session::load_profile(conn, &user_id)?;
    Ok(json!({ "user": user }))
}

fn auth_update_profile(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(&state.db)?;
    let user_id = target_user(state, params)?;
    let patch: ProfilePatch = parse_params(params, Some("patch"))?;
    let user = state.session.update_profile(conn, &user_id, patch)?;
    Ok(json!({ "user": user }))
}

fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "auth.session" => Ok(session_view(state)),
        "auth.register" => auth_register(state, &req.params),
        "auth.login" => auth_login(state, &req.params),
        "auth.logout" => auth_logout(state),
        "auth.getProfile" => auth_get_profile(state, &req.params),
        "auth.updateProfile" => auth_update_profile(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
