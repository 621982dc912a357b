//! HTTP surface: gloss and situation CRUD plus the `/record/{id}` endpoint
//! the closure client fetches from.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::HttpServerConfig;
use crate::db::Db;
use crate::error::{GlossError, Result};
use crate::model::{
    GlossUpdate, GlossWrite, LanguageCode, SituationQuery, SituationUpdate, SituationWrite,
};
use crate::service::{GlossService, SituationService};

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub glosses: GlossService,
    pub situations: SituationService,
}

impl AppState {
    pub fn new(db: Db) -> Self {
        let glosses = GlossService::new(db.clone());
        let situations = SituationService::new(db, glosses.resolver().clone());
        Self {
            glosses,
            situations,
        }
    }
}

/// Every successful body is wrapped as `{"data": ...}`.
#[derive(Serialize)]
struct Envelope<T> {
    data: T,
}

fn data<T: Serialize>(value: T) -> Json<Envelope<T>> {
    Json(Envelope { data: value })
}

impl IntoResponse for GlossError {
    fn into_response(self) -> Response {
        let status = match &self {
            GlossError::NotFound(_) => StatusCode::NOT_FOUND,
            GlossError::Conflict(_) => StatusCode::CONFLICT,
            GlossError::InvalidInput(_) | GlossError::DanglingReference(_) => {
                StatusCode::BAD_REQUEST
            }
            GlossError::FetchFailure(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the router. An empty `allowed_origins` allows any origin.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/record/:id", get(handle_record))
        .route("/glosses", get(list_glosses).post(create_gloss))
        .route(
            "/glosses/:id",
            get(get_gloss).patch(update_gloss).delete(delete_gloss),
        )
        .route("/situations", get(list_situations).post(create_situation))
        .route("/situations/summary", get(situation_summaries))
        .route(
            "/situations/:id",
            get(get_situation).patch(update_situation).delete(delete_situation),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Bind `host:port` and serve until the process exits.
pub async fn serve(config: &HttpServerConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        GlossError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;
    log::info!("Serving glossgraph on http://{}", addr);

    axum::serve(listener, router(state, &config.allowed_origins))
        .await
        .map_err(|e| {
            GlossError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GlossParams {
    language: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SituationParams {
    identifier: Option<String>,
    target_language: Option<String>,
    native_languages: Option<String>,
}

impl SituationParams {
    fn into_query(self) -> Result<SituationQuery> {
        Ok(SituationQuery {
            identifier: self.identifier,
            target_language: parse_language(self.target_language.as_deref())?,
            native_languages: match self.native_languages.as_deref() {
                Some(list) => LanguageCode::parse_list(list)?,
                None => Vec::new(),
            },
        })
    }
}

fn parse_language(value: Option<&str>) -> Result<Option<LanguageCode>> {
    value
        .filter(|v| !v.is_empty())
        .map(LanguageCode::from_str)
        .transpose()
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| GlossError::InvalidInput(rejection.body_text()))
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let record = state.glosses.resolver().resolve_single(&id).await?.to_dto();
    Ok(data(record).into_response())
}

async fn list_glosses(
    State(state): State<AppState>,
    Query(params): Query<GlossParams>,
) -> Result<Response> {
    let language = parse_language(params.language.as_deref())?;
    let glosses = state.glosses.list(language, params.content.as_deref()).await?;
    Ok(data(glosses).into_response())
}

async fn create_gloss(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GlossWrite>, JsonRejection>,
) -> Result<Response> {
    let created = state.glosses.create(body(payload)?).await?;
    Ok((StatusCode::CREATED, data(created)).into_response())
}

async fn get_gloss(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    Ok(data(state.glosses.find_by_id(&id).await?).into_response())
}

async fn update_gloss(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<GlossUpdate>, JsonRejection>,
) -> Result<Response> {
    Ok(data(state.glosses.update(&id, body(payload)?).await?).into_response())
}

async fn delete_gloss(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    state.glosses.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_situations(
    State(state): State<AppState>,
    Query(params): Query<SituationParams>,
) -> Result<Response> {
    let query = params.into_query()?;
    Ok(data(state.situations.list(&query).await?).into_response())
}

async fn situation_summaries(
    State(state): State<AppState>,
    Query(params): Query<SituationParams>,
) -> Result<Response> {
    let query = params.into_query()?;
    Ok(data(state.situations.list_summary(&query).await?).into_response())
}

async fn create_situation(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SituationWrite>, JsonRejection>,
) -> Result<Response> {
    let created = state.situations.create(body(payload)?).await?;
    Ok((StatusCode::CREATED, data(created)).into_response())
}

async fn get_situation(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Query(params): Query<SituationParams>,
) -> Result<Response> {
    let query = params.into_query()?;
    Ok(data(state.situations.find_by_id(&identifier, &query).await?).into_response())
}

async fn update_situation(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    payload: std::result::Result<Json<SituationUpdate>, JsonRejection>,
) -> Result<Response> {
    Ok(data(state.situations.update(&identifier, body(payload)?).await?).into_response())
}

async fn delete_situation(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Response> {
    state.situations.delete(&identifier).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::server_db;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn app() -> (Router, TempDir) {
        let (db, temp) = server_db().await;
        (router(AppState::new(db), &[]), temp)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        payload: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match payload {
            Some(value) => request
                .header("content-type", "application/json")
                .body(Body::from(value.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _temp) = app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_gloss_crud_round() {
        let (app, _temp) = app().await;

        let hello_json = json!({"language": "eng", "content": "hello"});
        let (status, created) = send(&app, "POST", "/glosses", Some(hello_json)).await;
        assert_eq!(status, StatusCode::CREATED);
        let hello = created["data"]["id"].as_str().unwrap().to_string();

        let (status, created) = send(
            &app,
            "POST",
            "/glosses",
            Some(json!({
                "language": "spa",
                "content": "hola",
                "relations": {"translations": [hello]}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let hola = created["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["data"]["translations"][0]["content"], "hello");

        let (status, body) = send(&app, "GET", &format!("/glosses/{}", hola), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["content"], "hola");

        let (status, body) = send(&app, "GET", "/glosses?language=spa&content=hola", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/glosses/{}", hola),
            Some(json!({"transcriptions": ["ˈola"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["transcriptions"][0], "ˈola");

        // Referenced by "hola", so it cannot go first.
        let (status, body) = send(&app, "DELETE", &format!("/glosses/{}", hello), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        let (status, _) = send(&app, "DELETE", &format!("/glosses/{}", hola), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &format!("/glosses/{}", hola), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_errors_use_error_envelope() {
        let (app, _temp) = app().await;

        let payload = json!({"language": "spa", "content": "hola"});
        send(&app, "POST", "/glosses", Some(payload.clone())).await;
        let (status, body) = send(&app, "POST", "/glosses", Some(payload)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("hola"));

        let (status, body) = send(&app, "GET", "/glosses?language=xxx", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("xxx"));

        let (status, body) = send(&app, "POST", "/glosses", Some(json!({"content": 3}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = send(&app, "GET", "/record/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_record_endpoint_and_situation_routes() {
        let (app, _temp) = app().await;

        let hello_json = json!({"language": "eng", "content": "hello"});
        let (_, hello) = send(&app, "POST", "/glosses", Some(hello_json)).await;
        let hello = hello["data"]["id"].as_str().unwrap().to_string();
        let (_, hola) = send(
            &app,
            "POST",
            "/glosses",
            Some(json!({
                "language": "spa",
                "content": "hola",
                "relations": {"translations": [hello]}
            })),
        )
        .await;
        let hola = hola["data"]["id"].as_str().unwrap().to_string();

        let (status, record) = send(&app, "GET", &format!("/record/{}", hello), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["data"]["content"], "hello");

        let situation = json!({
            "identifier": "greeting",
            "descriptions": [{"language": "eng", "content": "Saying hi"}],
            "targetLanguage": "spa",
            "challengesOfUnderstandingText": [
                {"text": "¡Hola!", "language": "spa", "glossIds": [hola]}
            ]
        });
        let (status, _) = send(&app, "POST", "/situations", Some(situation)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) =
            send(&app, "GET", "/situations/summary?targetLanguage=spa", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["identifier"], "greeting");
        assert_eq!(body["data"][0]["challengeCount"]["understanding"], 1);

        let (status, body) =
            send(&app, "GET", "/situations/greeting?nativeLanguages=deu", None).await;
        assert_eq!(status, StatusCode::OK);
        let glosses = &body["data"]["challengesOfUnderstandingText"][0]["glosses"];
        assert_eq!(glosses[0]["content"], "hola");
        assert!(glosses[0]["translations"].as_array().unwrap().is_empty());

        let (status, _) = send(&app, "GET", "/situations?nativeLanguages=eng,zzz", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "DELETE", "/situations/greeting", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", "/situations/greeting", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
