use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    config::Config,
    error::SessionError,
    llm::{self, RequestSpec},
    models::{ConnectionMode, ModelDraft, ModelPreset},
    registry,
    session::{self, Session, SessionSnapshot},
    telemetry,
};

type ApiError = (StatusCode, String);

/**
 * \brief 服务端共享状态：唯一的会话与复用的 HTTP 客户端。
 */
#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<Session>>,
    client: reqwest::Client,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        AppState {
            session: Arc::new(Mutex::new(Session::new(config))),
            client: reqwest::Client::new(),
        }
    }
}

/**
 * \brief 启动本地配置服务。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str, config: Config) -> Result<()> {
    let app = router(AppState::new(&config));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Configurator listening on http://{}", addr);
    println!("Live preview at http://{}/preview", addr);
    telemetry::log_event("server", &format!("listening addr={}", addr));
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/preview") }))
        .route("/preview", get(preview_page))
        .route("/embed.js", get(embed_script))
        .route("/api/state", get(get_state))
        .route("/api/presets", get(list_presets))
        .route("/api/presets/{id}/draft", get(preset_draft))
        .route("/api/models", post(create_model))
        .route("/api/models/{id}", put(update_model).delete(delete_model))
        .route("/api/models/{id}/select", post(select_model))
        .route("/api/style", put(update_style))
        .route("/api/widget/toggle", post(toggle_widget))
        .route("/api/widget/send", post(send_message))
        .route("/api/request/preview", post(request_preview))
        .route("/api/export", get(export))
        .with_state(state)
}

#[derive(Deserialize, Debug)]
struct ModelRequest {
    #[serde(flatten)]
    draft: ModelDraft,
    /** \brief 创建后立即选中 */
    #[serde(default)]
    select: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct SendRequest {
    text: String,
}

#[derive(Deserialize, Debug)]
struct RequestPreviewRequest {
    #[serde(flatten)]
    draft: ModelDraft,
    prompt: String,
}

#[derive(Serialize, Debug)]
struct ExportResponse {
    model_id: String,
    mode: ConnectionMode,
    includes_credential: bool,
    script: String,
    snippet: String,
}

fn internal_err<E: std::fmt::Display>(e: E) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn session_err(e: SessionError) -> ApiError {
    let status = match e {
        SessionError::Validation(_) => StatusCode::BAD_REQUEST,
        SessionError::UnknownModel(_) => StatusCode::NOT_FOUND,
        SessionError::BuiltInModel => StatusCode::CONFLICT,
    };
    (status, e.to_string())
}

async fn get_state(State(app): State<AppState>) -> Json<SessionSnapshot> {
    Json(app.session.lock().await.snapshot())
}

async fn list_presets() -> Json<&'static [ModelPreset]> {
    Json(registry::presets())
}

async fn preset_draft(Path(id): Path<String>) -> Result<Json<ModelDraft>, ApiError> {
    registry::draft_from_preset(&id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("preset {} not found", id)))
}

/**
 * \brief 新增模型，可选立即选中。
 */
async fn create_model(
    State(app): State<AppState>,
    Json(payload): Json<ModelRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut session = app.session.lock().await;
    let id = session.add_model(payload.draft).map_err(session_err)?;
    if payload.select.unwrap_or(false) {
        session.select_model(&id).map_err(session_err)?;
    }
    Ok(Json(session.snapshot()))
}

async fn update_model(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<ModelDraft>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut session = app.session.lock().await;
    session.update_model(&id, draft).map_err(session_err)?;
    Ok(Json(session.snapshot()))
}

async fn delete_model(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut session = app.session.lock().await;
    session.remove_model(&id).map_err(session_err)?;
    Ok(Json(session.snapshot()))
}

async fn select_model(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut session = app.session.lock().await;
    session.select_model(&id).map_err(session_err)?;
    Ok(Json(session.snapshot()))
}

async fn update_style(
    State(app): State<AppState>,
    Json(style): Json<crate::models::ButtonStyle>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut session = app.session.lock().await;
    session.set_style(style).map_err(session_err)?;
    Ok(Json(session.snapshot()))
}

async fn toggle_widget(State(app): State<AppState>) -> Json<SessionSnapshot> {
    let mut session = app.session.lock().await;
    session.toggle_widget();
    Json(session.snapshot())
}

/**
 * \brief 预览挂件发送消息。网络请求期间不持有会话锁。
 */
async fn send_message(
    State(app): State<AppState>,
    Json(payload): Json<SendRequest>,
) -> Json<SessionSnapshot> {
    let outgoing = app.session.lock().await.submit(&payload.text);
    let Some(outgoing) = outgoing else {
        return Json(app.session.lock().await.snapshot());
    };

    telemetry::log_event(
        "server.send",
        &format!(
            "model={} provider={} mode={} prompt_len={}",
            outgoing.model.name,
            outgoing.model.provider,
            outgoing.model.mode,
            outgoing.pending.content.len()
        ),
    );
    let reply = session::dispatch(&app.client, &outgoing).await;

    let mut session = app.session.lock().await;
    session.complete(&outgoing, reply);
    Json(session.snapshot())
}

/**
 * \brief 对未保存的表单生成请求描述，不发出网络请求。
 */
async fn request_preview(
    Json(payload): Json<RequestPreviewRequest>,
) -> Result<Json<RequestSpec>, ApiError> {
    let draft = registry::validate_draft(payload.draft)
        .map_err(|e| session_err(SessionError::Validation(e)))?;
    let model = draft.into_model("preview".to_string());
    Ok(Json(llm::build_request(&model, &payload.prompt)))
}

async fn export(State(app): State<AppState>) -> Result<Json<ExportResponse>, ApiError> {
    let session = app.session.lock().await;
    let model = session.selected_model();
    let response = ExportResponse {
        model_id: model.id.clone(),
        mode: model.mode,
        includes_credential: model.exposes_credential() && !model.api_key.is_empty(),
        script: session.export_script().map_err(internal_err)?,
        snippet: session.export_snippet().map_err(internal_err)?,
    };
    telemetry::log_event(
        "server.export",
        &format!("model={} mode={}", response.model_id, response.mode),
    );
    Ok(Json(response))
}

async fn embed_script(State(app): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let script = app.session.lock().await.export_script().map_err(internal_err)?;
    Ok((
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        script,
    ))
}

async fn preview_page(State(app): State<AppState>) -> Result<Html<String>, ApiError> {
    let page = app.session.lock().await.preview_page().map_err(internal_err)?;
    Ok(Html(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    async fn spawn(config: Config) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = router(AppState::new(&config));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn proxy_model() -> Value {
        json!({
            "name": "My proxy",
            "provider": "anthropic",
            "endpoint": "https://example.com/api/chat",
            "api_key": "sk-proxy-should-not-leak",
            "model": "claude-3-5-sonnet-latest",
            "mode": "proxy",
            "select": true
        })
    }

    #[tokio::test]
    async fn test_create_select_and_export() {
        let base = spawn(Config::default()).await;
        let client = reqwest::Client::new();

        let state: Value = client
            .post(format!("{}/api/models", base))
            .json(&proxy_model())
            .send()
            .await
            .expect("create")
            .json()
            .await
            .expect("state json");
        assert_eq!(state["models"].as_array().map(|a| a.len()), Some(2));
        let new_id = state["models"][1]["id"].as_str().expect("id").to_string();
        assert_eq!(state["selected_model_id"], new_id.as_str());
        assert_eq!(state["widget"]["open"], false);
        assert!(state["widget"]["messages"][0]["content"]
            .as_str()
            .unwrap_or_default()
            .contains("My proxy"));

        let export: Value = client
            .get(format!("{}/api/export", base))
            .send()
            .await
            .expect("export")
            .json()
            .await
            .expect("export json");
        assert_eq!(export["mode"], "proxy");
        assert_eq!(export["includes_credential"], false);
        assert!(!export.to_string().contains("sk-proxy-should-not-leak"));

        let js = client
            .get(format!("{}/embed.js", base))
            .send()
            .await
            .expect("embed.js")
            .text()
            .await
            .expect("js body");
        assert!(js.contains("WidgetForge chat widget"));
        assert!(!js.contains("sk-proxy-should-not-leak"));
    }

    #[tokio::test]
    async fn test_invalid_model_is_rejected() {
        let base = spawn(Config::default()).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/models", base))
            .json(&json!({
                "name": "broken",
                "provider": "openai-compatible",
                "endpoint": "not a url",
                "model": "gpt-4o-mini",
                "mode": "direct"
            }))
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_builtin_model_cannot_be_deleted() {
        let base = spawn(Config::default()).await;
        let client = reqwest::Client::new();
        let resp = client
            .delete(format!("{}/api/models/{}", base, registry::BUILTIN_MODEL_ID))
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);

        let resp = client
            .delete(format!("{}/api/models/missing", base))
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_uses_simulated_demo_reply() {
        let base = spawn(Config::default()).await;
        let client = reqwest::Client::new();

        let blank: Value = client
            .post(format!("{}/api/widget/send", base))
            .json(&json!({"text": "   "}))
            .send()
            .await
            .expect("send blank")
            .json()
            .await
            .expect("json");
        assert_eq!(blank["widget"]["messages"].as_array().map(|a| a.len()), Some(1));

        let state: Value = client
            .post(format!("{}/api/widget/send", base))
            .json(&json!({"text": "hello"}))
            .send()
            .await
            .expect("send")
            .json()
            .await
            .expect("json");
        let messages = state["widget"]["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["content"], session::simulated_reply("hello"));
        assert_eq!(state["widget"]["phase"], "idle");
    }

    #[tokio::test]
    async fn test_request_preview_returns_wire_shape() {
        let base = spawn(Config::default()).await;
        let spec: Value = reqwest::Client::new()
            .post(format!("{}/api/request/preview", base))
            .json(&json!({
                "name": "g",
                "provider": "gemini",
                "endpoint": "https://generativelanguage.googleapis.com/v1beta",
                "api_key": "k1",
                "model": "gemini-1.5-flash",
                "prompt": "hi"
            }))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(
            spec["url"],
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key=k1"
        );
        assert_eq!(spec["body"], json!({"contents": [{"parts": [{"text": "hi"}]}]}));
    }
}
