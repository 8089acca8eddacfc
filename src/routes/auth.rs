use axum::extract::{Form, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::{error::AppResult, state::AppState};

#[derive(Deserialize)]
pub struct RegisterQuery {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub pswd: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub pswd: String,
}

#[derive(Serialize)]
pub struct Envelope<T> {
    pub response: T,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub login: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

pub async fn register(
    State(state): State<AppState>,
    Query(query): Query<RegisterQuery>,
) -> AppResult<Json<Envelope<RegisterResponse>>> {
    state
        .credentials
        .register(&query.token, &query.login, &query.pswd)
        .await?;

    Ok(Json(Envelope {
        response: RegisterResponse { login: query.login },
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Json<Envelope<LoginResponse>>> {
    let token = state.sessions.login(&form.login, &form.pswd).await?;
    info!(login = %form.login, "login succeeded");

    Ok(Json(Envelope {
        response: LoginResponse { token },
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<Envelope<Map<String, Value>>>> {
    state.sessions.logout(&token).await?;

    Ok(Json(Envelope {
        response: flag(token),
    }))
}

/// `{"<key>": true}`, the acknowledgement shape used by the delete endpoints.
pub fn flag(key: String) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key, Value::Bool(true));
    map
}
