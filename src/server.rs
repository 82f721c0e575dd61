//! HTTP surface: router, shared state and handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::memory::DEFAULT_SESSION;
use crate::orchestrator::{InterviewAgent, SourceRef};
use crate::resume::ResumeAnalyzer;
use crate::role::JobRole;
use crate::speech::{stage_upload, upload_suffix, SpeechServices};

/// Largest accepted request body (resume PDFs and audio clips).
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    agent: Arc<InterviewAgent>,
    resume: Arc<ResumeAnalyzer>,
    speech: Option<SpeechServices>,
}

impl AppState {
    /// Bundles the long-lived services; `speech` is `None` when voice is disabled.
    pub fn new(
        agent: Arc<InterviewAgent>,
        resume: Arc<ResumeAnalyzer>,
        speech: Option<SpeechServices>,
    ) -> Self {
        Self {
            agent,
            resume,
            speech,
        }
    }

    fn speech(&self) -> AppResult<&SpeechServices> {
        self.speech
            .as_ref()
            .ok_or_else(|| AppError::Config("speech is disabled on this server".into()))
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sessions", post(create_session))
        .route("/chattext", post(chat_text))
        .route("/upload_resume", post(upload_resume))
        .route("/voice_chat", post(voice_chat))
        .route("/transcribe", post(transcribe))
        .route("/reset_memory", post(reset_memory))
        .route("/greet", get(greet))
        .route("/end_interview", post(end_interview))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    query: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    query: String,
    answer: String,
    role: JobRole,
    sources: Vec<SourceRef>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionRequest {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ResumeResponse {
    status: &'static str,
    role: JobRole,
    keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
struct VoiceChatResponse {
    transcript: String,
    answer: String,
    audio_base64: String,
}

#[derive(Debug, Serialize)]
struct TranscriptResponse {
    transcript: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum GreetMode {
    #[default]
    Text,
    Voice,
}

#[derive(Debug, Deserialize)]
struct GreetQuery {
    #[serde(default)]
    mode: GreetMode,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct GreetResponse {
    text: String,
    audio_base64: Option<String>,
    role: JobRole,
}

#[derive(Debug, Serialize)]
struct FeedbackResponse {
    feedback: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.agent.sessions().len().await,
    })
}

async fn create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let session_id = state.agent.sessions().create().await;
    tracing::info!(session = %session_id, "session created");
    Json(SessionResponse { session_id })
}

async fn chat_text(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Json<ChatResponse>> {
    let Json(request) = payload.map_err(|err| AppError::InvalidRequest(err.body_text()))?;
    let session = session_or_default(request.session_id.as_deref());
    let answer = state
        .agent
        .ask(session, &request.query, request.role.as_deref())
        .await?;
    Ok(Json(ChatResponse {
        query: request.query,
        answer: answer.answer,
        role: answer.job_role,
        sources: answer.sources,
    }))
}

async fn upload_resume(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ResumeResponse>> {
    let form = UploadForm::read(multipart).await?;
    let session = session_or_default(form.field("session_id")).to_string();
    let upload = form.into_file()?;
    let analysis = state.resume.analyze(upload.bytes.to_vec()).await?;
    state.agent.record_resume(&session, &analysis).await?;
    Ok(Json(ResumeResponse {
        status: "Resume added to temporary context",
        role: analysis.job_role,
        keywords: analysis.keywords,
    }))
}

async fn voice_chat(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<VoiceChatResponse>> {
    let speech = state.speech()?;
    let form = UploadForm::read(multipart).await?;
    let session = session_or_default(form.field("session_id")).to_string();
    let role = form.field("role").map(str::to_string);
    let upload = form.into_file()?;

    let transcript = transcribe_upload(speech, &upload, ".webm").await?;
    let answer = state
        .agent
        .ask(&session, &transcript, role.as_deref())
        .await?;
    let audio = speech
        .synthesizer
        .synthesize(&answer.answer)
        .await
        .map_err(AppError::audio)?;
    Ok(Json(VoiceChatResponse {
        transcript,
        answer: answer.answer,
        audio_base64: BASE64.encode(audio),
    }))
}

async fn transcribe(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<TranscriptResponse>> {
    let speech = state.speech()?;
    let upload = UploadForm::read(multipart).await?.into_file()?;
    let transcript = transcribe_upload(speech, &upload, ".wav").await?;
    Ok(Json(TranscriptResponse { transcript }))
}

async fn reset_memory(State(state): State<AppState>, body: Bytes) -> AppResult<Json<StatusResponse>> {
    let request = optional_json::<SessionRequest>(&body)?;
    state
        .agent
        .reset(session_or_default(request.session_id.as_deref()))
        .await?;
    Ok(Json(StatusResponse { status: "cleared" }))
}

async fn greet(
    State(state): State<AppState>,
    query: Result<Query<GreetQuery>, QueryRejection>,
) -> AppResult<Json<GreetResponse>> {
    let Query(query) = query.map_err(|err| AppError::InvalidRequest(err.body_text()))?;
    let session = session_or_default(query.session_id.as_deref());
    let speech = match query.mode {
        GreetMode::Text => None,
        GreetMode::Voice => Some(state.speech()?),
    };
    let greeting = state.agent.greet(session, query.role.as_deref()).await?;
    let audio_base64 = match speech {
        None => None,
        Some(speech) => {
            let audio = speech
                .synthesizer
                .synthesize(&greeting.text)
                .await
                .map_err(AppError::audio)?;
            Some(BASE64.encode(audio))
        }
    };
    Ok(Json(GreetResponse {
        text: greeting.text,
        audio_base64,
        role: greeting.job_role,
    }))
}

async fn end_interview(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<FeedbackResponse>> {
    let request = optional_json::<SessionRequest>(&body)?;
    let feedback = state
        .agent
        .end(session_or_default(request.session_id.as_deref()))
        .await?;
    Ok(Json(FeedbackResponse { feedback }))
}

fn session_or_default(session_id: Option<&str>) -> &str {
    session_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_SESSION)
}

/// Parses a JSON body that may be absent altogether.
fn optional_json<T: for<'de> Deserialize<'de> + Default>(body: &[u8]) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| AppError::InvalidRequest(format!("malformed JSON body: {err}")))
}

async fn transcribe_upload(
    speech: &SpeechServices,
    upload: &UploadedFile,
    default_suffix: &str,
) -> AppResult<String> {
    let suffix = upload_suffix(upload.file_name.as_deref(), default_suffix);
    let staged = stage_upload(&upload.bytes, &suffix).map_err(AppError::audio)?;
    let wav = speech
        .converter
        .to_wav(&staged)
        .await
        .map_err(AppError::audio)?;
    let transcript = speech
        .transcriber
        .transcribe(&wav)
        .await
        .map_err(AppError::audio)?;
    tracing::debug!(bytes = upload.bytes.len(), chars = transcript.len(), "transcribed upload");
    Ok(transcript)
}

struct UploadedFile {
    file_name: Option<String>,
    bytes: Bytes,
}

/// Multipart body split into the `file` part and plain text fields.
struct UploadForm {
    file: Option<UploadedFile>,
    fields: Vec<(String, String)>,
}

impl UploadForm {
    async fn read(multipart: Result<Multipart, MultipartRejection>) -> AppResult<Self> {
        let mut multipart = multipart.map_err(|err| AppError::InvalidRequest(err.body_text()))?;
        let mut form = UploadForm {
            file: None,
            fields: Vec::new(),
        };
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| AppError::InvalidRequest(format!("malformed multipart body: {err}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|err| {
                    AppError::InvalidRequest(format!("failed to read uploaded file: {err}"))
                })?;
                form.file = Some(UploadedFile { file_name, bytes });
            } else {
                let value = field.text().await.map_err(|err| {
                    AppError::InvalidRequest(format!("failed to read field {name}: {err}"))
                })?;
                form.fields.push((name, value));
            }
        }
        Ok(form)
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, value)| key == name && !value.trim().is_empty())
            .map(|(_, value)| value.trim())
    }

    fn into_file(self) -> AppResult<UploadedFile> {
        match self.file {
            Some(file) if !file.bytes.is_empty() => Ok(file),
            Some(_) => Err(AppError::InvalidRequest("uploaded file is empty".into())),
            None => Err(AppError::InvalidRequest("missing multipart field `file`".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::embedder::HashingEmbedder;
    use crate::memory::SessionStore;
    use crate::orchestrator::AgentSettings;
    use crate::prompt::PromptComposer;
    use crate::testing::{CopyConverter, EchoSynthesizer, FixedTranscriber, ScriptedLlm, StaticRetriever};

    const BOUNDARY: &str = "interview-test-boundary";

    fn app_with(llm: Arc<ScriptedLlm>, speech: bool) -> Router {
        let agent = InterviewAgent::new(
            StaticRetriever::new(&["Ownership moves values between bindings."]),
            llm,
            PromptComposer::default(),
            Arc::new(SessionStore::new(16, Duration::from_secs(600))),
            AgentSettings::default(),
        );
        let speech = speech.then(|| SpeechServices {
            transcriber: Arc::new(FixedTranscriber("What is ownership?".into())),
            synthesizer: Arc::new(EchoSynthesizer),
            converter: Arc::new(CopyConverter),
        });
        router(AppState::new(
            Arc::new(agent),
            Arc::new(ResumeAnalyzer::new(Arc::new(HashingEmbedder::new(64)))),
            speech,
        ))
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_request(uri: &str, file_name: &str, file: &[u8], fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn chattext_without_resume_or_role_is_general() {
        let llm = ScriptedLlm::always("Please introduce yourself.");
        let app = app_with(llm.clone(), false);
        let (status, body) = send(
            &app,
            json_request(Method::POST, "/chattext", json!({"query": "hello"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "hello");
        assert_eq!(body["answer"], "Please introduce yourself.");
        assert_eq!(body["role"], "General");
        assert_eq!(body["sources"][0]["source_id"], "kb/doc0.txt");
        assert!(llm.prompts()[0].contains("Detected Job Role: General"));
    }

    #[tokio::test]
    async fn chattext_rejects_bad_input_with_error_kind() {
        let app = app_with(ScriptedLlm::always("unused"), false);
        let (status, body) = send(
            &app,
            json_request(Method::POST, "/chattext", json!({"query": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/chattext")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn sessions_keep_separate_transcripts() {
        let llm = ScriptedLlm::always("Next question.");
        let app = app_with(llm.clone(), false);
        let (_, created) = send(
            &app,
            Request::builder()
                .method(Method::POST)
                .uri("/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let session = created["session_id"].as_str().unwrap().to_string();

        send(
            &app,
            json_request(
                Method::POST,
                "/chattext",
                json!({"query": "private answer", "session_id": session}),
            ),
        )
        .await;
        send(
            &app,
            json_request(Method::POST, "/chattext", json!({"query": "shared"})),
        )
        .await;

        let prompts = llm.prompts();
        assert!(!prompts[1].contains("private answer"));
    }

    #[tokio::test]
    async fn voice_chat_transcribes_answers_and_speaks() {
        let app = app_with(ScriptedLlm::always("Ownership means one owner."), true);
        let (status, body) = send(
            &app,
            multipart_request("/voice_chat", "clip.webm", b"fake audio", &[("role", "Software Engineer")]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transcript"], "What is ownership?");
        assert_eq!(body["answer"], "Ownership means one owner.");
        assert_eq!(
            body["audio_base64"],
            BASE64.encode("Ownership means one owner.")
        );
    }

    #[tokio::test]
    async fn transcribe_requires_a_file_and_enabled_speech() {
        let app = app_with(ScriptedLlm::always("unused"), true);
        let (status, body) = send(&app, multipart_request("/transcribe", "a.wav", b"RIFF", &[])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transcript"], "What is ownership?");

        let (status, body) = send(&app, multipart_request("/transcribe", "a.wav", b"", &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");

        let disabled = app_with(ScriptedLlm::always("unused"), false);
        let (status, body) = send(&disabled, multipart_request("/transcribe", "a.wav", b"RIFF", &[])).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["kind"], "config");
    }

    #[tokio::test]
    async fn greet_returns_audio_only_in_voice_mode() {
        let app = app_with(ScriptedLlm::always("Welcome!"), true);
        let request = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

        let (status, body) = send(&app, request("/greet?role=Sales%20Executive")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Welcome!");
        assert_eq!(body["role"], "Sales Executive");
        assert!(body["audio_base64"].is_null());

        let (_, body) = send(&app, request("/greet?mode=voice")).await;
        assert_eq!(body["audio_base64"], BASE64.encode("Welcome!"));

        let (status, _) = send(&app, request("/greet?mode=loud")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn voice_greeting_without_speech_leaves_memory_untouched() {
        let llm = ScriptedLlm::always("Hello there");
        let app = app_with(llm.clone(), false);

        let request = Request::builder()
            .uri("/greet?mode=voice")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["kind"], "config");
        assert!(llm.prompts().is_empty());

        send(
            &app,
            json_request(Method::POST, "/chattext", json!({"query": "ready"})),
        )
        .await;
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(!prompts[0].contains("Give a friendly greeting"));
    }

    #[tokio::test]
    async fn end_interview_and_reset_accept_empty_bodies() {
        let llm = ScriptedLlm::queued(&["Q1", "Final review"], "unused");
        let app = app_with(llm.clone(), false);
        send(
            &app,
            json_request(Method::POST, "/chattext", json!({"query": "my answer"})),
        )
        .await;

        let empty_post = |uri: &str| {
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };
        let (status, body) = send(&app, empty_post("/end_interview")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["feedback"], "Final review");
        assert!(llm.prompts()[1].contains("User: my answer"));

        let (status, body) = send(&app, empty_post("/reset_memory")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cleared");
    }

    #[tokio::test]
    async fn upload_resume_rejects_non_pdf() {
        let app = app_with(ScriptedLlm::always("unused"), false);
        let (status, body) = send(
            &app,
            multipart_request("/upload_resume", "resume.pdf", b"plain text, not a pdf", &[]),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "ingestion");
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let app = app_with(ScriptedLlm::always("unused"), false);
        let (status, body) = send(
            &app,
            Request::builder().uri("/healthz").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
