use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::assets::Asset;
use crate::chat::{ChatSession, StreamAccumulator, APOLOGY, WORKING_MESSAGES, WORKING_MESSAGE_INTERVAL};
use crate::error::ApiError;
use crate::gemini::{self, GeminiError, MediaBackend, VIDEO_TIMEOUT_MESSAGE};
use crate::models::{ChatSendRequest, ConsentRequest, DescriptionRequest, PromptRequest, SelectRequest, UploadRequest};
use crate::pipeline::{
    PipelineSession, AD_DOWNLOAD_NAME, ERR_AD_FAILED, ERR_KEY_NOT_FOUND, ERR_PHOTO_SHOOT_FAILED,
    ERR_UNREADABLE_FILE, ERR_UNREADABLE_MODEL, ERR_VIDEO_FAILED, PRODUCT_DOWNLOAD_NAME,
    VIDEO_DOWNLOAD_NAME, VIDEO_WORKING_MESSAGES, VIDEO_WORKING_MESSAGE_INTERVAL,
};
use crate::pricing;
use crate::prompts::{AD_SCENE_CATEGORIES, PHOTO_SHOOT_CATEGORIES};

pub const VIDEO_KEY_REQUIRED_MESSAGE: &str = "Video generation with Veo requires you to select \
    your own API key. This ensures you are aware of potential billing.";

pub type SessionStore = Arc<RwLock<HashMap<Uuid, PipelineSession>>>;
pub type ChatStore = Arc<RwLock<HashMap<Uuid, ChatSession>>>;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub chats: ChatStore,
    pub backend: Arc<dyn MediaBackend>,
    /// Whether the user has completed video credential selection.
    pub video_key_selected: Arc<AtomicBool>,
    /// Whether a video-capable key is configured at all.
    pub video_key_available: bool,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView<'a> {
    #[serde(flatten)]
    session: &'a PipelineSession,
    capabilities: crate::pipeline::Capabilities,
    /// Blocking instruction shown instead of the ad stage's controls while
    /// the studio has produced nothing.
    ad_locked_message: Option<&'static str>,
    video_credential_selected: bool,
}

fn view(session: &PipelineSession, state: &AppState) -> serde_json::Value {
    let capabilities = session.capabilities();
    serde_json::to_value(SessionView {
        session,
        capabilities,
        ad_locked_message: (!capabilities.ad_campaign).then_some(crate::pipeline::AD_LOCKED_MESSAGE),
        video_credential_selected: state.video_key_selected.load(Ordering::Relaxed),
    })
    .unwrap_or_default()
}

fn mutate(
    state: &AppState,
    id: Uuid,
    apply: impl FnOnce(&mut PipelineSession) -> Result<(), ApiError>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or(ApiError::NotFound)?;
    apply(session)?;
    session.touch();
    Ok(Json(view(session, state)))
}

#[derive(Clone, Copy)]
enum StageSlot {
    Studio,
    Ad,
    Video,
}

/// Clears a stage's in-flight state on every exit path, including the
/// request future being dropped on disconnect, and tears down the
/// working-message cycler with it.
struct FlightGuard {
    sessions: SessionStore,
    id: Uuid,
    slot: StageSlot,
    cycler: Option<JoinHandle<()>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.cycler.take() {
            handle.abort();
        }
        let mut guard = self.sessions.write();
        if let Some(session) = guard.get_mut(&self.id) {
            match self.slot {
                StageSlot::Studio => session.studio.submitting = false,
                StageSlot::Ad => session.ad.submitting = false,
                StageSlot::Video => {
                    session.video.submitting = false;
                    session.video.working_message = None;
                }
            }
        }
    }
}

/// Same discipline for a chat turn: the stream settles or errors, the
/// session is marked idle and the cycler dies with it.
struct ChatFlightGuard {
    chats: ChatStore,
    id: Uuid,
    cycler: Option<JoinHandle<()>>,
}

impl Drop for ChatFlightGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.cycler.take() {
            handle.abort();
        }
        let mut guard = self.chats.write();
        if let Some(session) = guard.get_mut(&self.id) {
            session.finish_stream();
        }
    }
}

fn spawn_video_cycler(sessions: SessionStore, id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        for message in VIDEO_WORKING_MESSAGES.iter().cycle() {
            {
                let mut guard = sessions.write();
                if let Some(session) = guard.get_mut(&id) {
                    session.video.working_message = Some((*message).to_string());
                }
            }
            tokio::time::sleep(VIDEO_WORKING_MESSAGE_INTERVAL).await;
        }
    })
}

fn spawn_chat_cycler(chats: ChatStore, id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        for message in WORKING_MESSAGES.iter().cycle() {
            {
                let mut guard = chats.write();
                if let Some(session) = guard.get_mut(&id) {
                    session.working_message = Some((*message).to_string());
                }
            }
            tokio::time::sleep(WORKING_MESSAGE_INTERVAL).await;
        }
    })
}

fn download_response(data_url: &str, filename: &str) -> Result<Response, ApiError> {
    let asset = Asset::from_data_url(data_url).map_err(|_| ApiError::Decode(ERR_UNREADABLE_FILE))?;
    let bytes = asset.bytes().map_err(|_| ApiError::Decode(ERR_UNREADABLE_FILE))?;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        asset
            .mime_type()
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", filename).parse().unwrap(),
    );
    Ok((StatusCode::OK, headers, bytes).into_response())
}

// --- Session ---

pub async fn create_session(State(state): State<AppState>) -> Json<serde_json::Value> {
    let session = PipelineSession::new();
    info!("🚀 Created pipeline session {}", session.id);
    let body = view(&session, &state);
    state.sessions.write().insert(session.id, session);
    Json(body)
}

pub async fn get_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let guard = state.sessions.read();
    let session = guard.get(&id).ok_or(ApiError::NotFound)?;
    Ok(Json(view(session, &state)))
}

// --- Photo studio ---

pub async fn upload_product(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<UploadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let asset = body.into_asset().map_err(|e| {
        error!("❌ Product upload unreadable: {}", e);
        ApiError::Decode(ERR_UNREADABLE_FILE)
    })?;
    mutate(&state, id, |session| {
        session.studio.load_product(asset);
        Ok(())
    })
}

pub async fn upload_model_photo(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<UploadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let asset = body.into_asset().map_err(|e| {
        error!("❌ Model photo unreadable: {}", e);
        ApiError::Decode(ERR_UNREADABLE_MODEL)
    })?;
    mutate(&state, id, |session| {
        session.studio.load_model_photo(asset);
        Ok(())
    })
}

pub async fn set_consent(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ConsentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        session.studio.set_consent(body.granted);
        Ok(())
    })
}

pub async fn studio_select(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SelectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        session
            .studio
            .select(&body.key, &body.value)
            .map_err(|e| ApiError::Validation(e.to_string()))
    })
}

pub async fn studio_prompt(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<PromptRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        session.studio.assistant.override_prompt(body.prompt);
        Ok(())
    })
}

pub async fn generate_photo_shoot(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let plan = {
        let mut guard = state.sessions.write();
        let session = guard.get_mut(&id).ok_or(ApiError::NotFound)?;
        if session.studio.submitting {
            return Err(ApiError::Busy("A photoshoot is already being generated."));
        }
        let plan = session
            .studio
            .prepare_submit()
            .map_err(|message| ApiError::Validation(message.to_string()))?;
        session.studio.submitting = true;
        session.studio.error = None;
        plan
    };

    let _flight = FlightGuard {
        sessions: state.sessions.clone(),
        id,
        slot: StageSlot::Studio,
        cycler: None,
    };
    info!("🎯 Generating photoshoot for session {} ({} input image(s))", id, plan.images.len());
    let result = state.backend.edit_image(&plan.images, &plan.prompt).await;

    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or(ApiError::NotFound)?;
    match result {
        Ok(image_b64) => {
            session.studio.record_success(&image_b64);
            session.propagate_from_studio();
            session.touch();
            info!("✅ Photoshoot generated for session {}", id);
            Ok(Json(view(session, &state)))
        }
        Err(e) => {
            error!("❌ Photoshoot generation failed: {}", e);
            session.studio.record_failure();
            session.touch();
            Err(ApiError::Upstream(ERR_PHOTO_SHOOT_FAILED.to_string()))
        }
    }
}

pub async fn studio_undo(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        if session.studio.history.undo() {
            session.propagate_from_studio();
        }
        Ok(())
    })
}

pub async fn studio_redo(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        if session.studio.history.redo() {
            session.propagate_from_studio();
        }
        Ok(())
    })
}

pub async fn studio_download(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let data_url = {
        let guard = state.sessions.read();
        let session = guard.get(&id).ok_or(ApiError::NotFound)?;
        session
            .studio
            .history
            .active()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Validation("No generated image to download yet.".to_string()))?
    };
    download_response(&data_url, PRODUCT_DOWNLOAD_NAME)
}

// --- Ad campaign ---

pub async fn ad_description(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<DescriptionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        session.ad.set_description(body.description);
        Ok(())
    })
}

pub async fn ad_select(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SelectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        session
            .ad
            .select(&body.key, &body.value)
            .map_err(|e| ApiError::Validation(e.to_string()))
    })
}

pub async fn ad_prompt(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<PromptRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        session.ad.assistant.override_prompt(body.prompt);
        Ok(())
    })
}

pub async fn generate_ad_scene(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let plan = {
        let mut guard = state.sessions.write();
        let session = guard.get_mut(&id).ok_or(ApiError::NotFound)?;
        if session.ad.submitting {
            return Err(ApiError::Busy("An ad image is already being generated."));
        }
        let plan = session
            .ad
            .prepare_submit(session.photo_shoot_result.as_ref())
            .map_err(|message| ApiError::Validation(message.to_string()))?;
        session.ad.submitting = true;
        session.ad.error = None;
        plan
    };

    let _flight = FlightGuard {
        sessions: state.sessions.clone(),
        id,
        slot: StageSlot::Ad,
        cycler: None,
    };
    info!("🎯 Generating ad scene for session {}", id);
    let result = state.backend.edit_image(&plan.images, &plan.prompt).await;

    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or(ApiError::NotFound)?;
    match result {
        Ok(image_b64) => {
            session.ad.record_success(&image_b64);
            session.touch();
            info!("✅ Ad scene generated for session {}", id);
            Ok(Json(view(session, &state)))
        }
        Err(e) => {
            error!("❌ Ad scene generation failed: {}", e);
            session.ad.record_failure();
            session.touch();
            Err(ApiError::Upstream(ERR_AD_FAILED.to_string()))
        }
    }
}

pub async fn ad_undo(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        session.ad.history.undo();
        Ok(())
    })
}

pub async fn ad_redo(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        session.ad.history.redo();
        Ok(())
    })
}

pub async fn ad_download(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let data_url = {
        let guard = state.sessions.read();
        let session = guard.get(&id).ok_or(ApiError::NotFound)?;
        session
            .ad
            .history
            .active()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Validation("No generated ad to download yet.".to_string()))?
    };
    download_response(&data_url, AD_DOWNLOAD_NAME)
}

// --- Video commercial ---

pub async fn video_prompt(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<PromptRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    mutate(&state, id, |session| {
        session.video.prompt = body.prompt;
        Ok(())
    })
}

pub async fn video_seed(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<UploadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let asset = body.into_asset().map_err(|e| {
        error!("❌ Video seed unreadable: {}", e);
        ApiError::Decode(ERR_UNREADABLE_FILE)
    })?;
    mutate(&state, id, |session| {
        session.video.seed_upload = Some(asset);
        Ok(())
    })
}

pub async fn generate_video_commercial(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.video_key_selected.load(Ordering::Relaxed) {
        return Err(ApiError::CredentialRequired(VIDEO_KEY_REQUIRED_MESSAGE.to_string()));
    }

    let plan = {
        let mut guard = state.sessions.write();
        let session = guard.get_mut(&id).ok_or(ApiError::NotFound)?;
        if session.photo_shoot_result.is_none() {
            return Err(ApiError::Validation(crate::pipeline::ERR_NO_HANDOFF.to_string()));
        }
        if session.video.submitting {
            return Err(ApiError::Busy("A video is already being generated."));
        }
        let plan = session
            .video
            .prepare_submit()
            .map_err(|message| ApiError::Validation(message.to_string()))?;
        session.video.submitting = true;
        session.video.error = None;
        session.video.video = None;
        plan
    };

    let _flight = FlightGuard {
        sessions: state.sessions.clone(),
        id,
        slot: StageSlot::Video,
        cycler: Some(spawn_video_cycler(state.sessions.clone(), id)),
    };
    info!("🎬 Generating video commercial for session {}", id);
    let result = gemini::generate_video(state.backend.as_ref(), &plan.prompt, plan.seed.as_ref()).await;

    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or(ApiError::NotFound)?;
    match result {
        Ok(video) => {
            session.video.record_success(video);
            session.touch();
            info!("✅ Video commercial generated for session {}", id);
            Ok(Json(view(session, &state)))
        }
        Err(e) if e.is_key_not_found() => {
            error!("❌ Video key rejected: {}", e);
            // The cached selection is stale; route the user back to key selection.
            state.video_key_selected.store(false, Ordering::Relaxed);
            session.video.record_failure(ERR_KEY_NOT_FOUND);
            session.touch();
            Err(ApiError::CredentialRequired(ERR_KEY_NOT_FOUND.to_string()))
        }
        Err(GeminiError::Timeout) => {
            error!("❌ Video generation timed out for session {}", id);
            session.video.record_failure(VIDEO_TIMEOUT_MESSAGE);
            session.touch();
            Err(ApiError::Timeout(VIDEO_TIMEOUT_MESSAGE.to_string()))
        }
        Err(e) => {
            error!("❌ Video generation failed: {}", e);
            session.video.record_failure(ERR_VIDEO_FAILED);
            session.touch();
            Err(ApiError::Upstream(ERR_VIDEO_FAILED.to_string()))
        }
    }
}

pub async fn video_download(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let video = {
        let guard = state.sessions.read();
        let session = guard.get(&id).ok_or(ApiError::NotFound)?;
        session
            .video
            .video
            .clone()
            .ok_or_else(|| ApiError::Validation("No generated video to download yet.".to_string()))?
    };
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", VIDEO_DOWNLOAD_NAME).parse().unwrap(),
    );
    Ok((StatusCode::OK, headers, video).into_response())
}

// --- Video credential selection ---

pub async fn get_video_credential(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "selected": state.video_key_selected.load(Ordering::Relaxed) }))
}

pub async fn select_video_credential(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.video_key_available {
        return Err(ApiError::CredentialRequired(
            "No video-capable API key is configured. Set VEO_API_KEY or GEMINI_API_KEY.".to_string(),
        ));
    }
    state.video_key_selected.store(true, Ordering::Relaxed);
    info!("🔑 Video API key selected");
    Ok(Json(json!({ "selected": true })))
}

// --- Chat ---

pub async fn create_chat(State(state): State<AppState>) -> Json<ChatSession> {
    let session = ChatSession::new();
    info!("💬 Created chat session {}", session.id);
    state.chats.write().insert(session.id, session.clone());
    Json(session)
}

pub async fn get_chat(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ChatSession>, ApiError> {
    let guard = state.chats.read();
    let session = guard.get(&id).cloned().ok_or(ApiError::NotFound)?;
    Ok(Json(session))
}

pub async fn send_chat_message(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ChatSendRequest>,
) -> Result<Response, ApiError> {
    let text = {
        let mut guard = state.chats.write();
        let session = guard.get_mut(&id).ok_or(ApiError::NotFound)?;
        if session.streaming {
            return Err(ApiError::Busy("A response is already in flight."));
        }
        match session.begin_send(&body.text) {
            Some(text) => text,
            // Blank input: nothing recorded, no request issued.
            None => return Ok(StatusCode::NO_CONTENT.into_response()),
        }
    };

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    let chats = state.chats.clone();
    let backend = state.backend.clone();
    tokio::spawn(async move {
        let _flight = ChatFlightGuard {
            chats: chats.clone(),
            id,
            cycler: Some(spawn_chat_cycler(chats.clone(), id)),
        };
        match backend.stream_chat(&text).await {
            Ok(mut stream) => {
                let mut accumulator = StreamAccumulator::default();
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(increment) => {
                            if increment.is_empty() {
                                continue;
                            }
                            {
                                let mut guard = chats.write();
                                if let Some(session) = guard.get_mut(&id) {
                                    accumulator.push(session, &increment);
                                }
                            }
                            // A closed receiver means the client navigated
                            // away; the turn still completes into the session.
                            let _ = tx.send(Ok(Event::default().data(increment))).await;
                        }
                        Err(e) => {
                            error!("❌ Chat stream failed: {}", e);
                            {
                                let mut guard = chats.write();
                                if let Some(session) = guard.get_mut(&id) {
                                    session.record_failure();
                                }
                            }
                            let _ = tx.send(Ok(Event::default().event("error").data(APOLOGY))).await;
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!("❌ Chat request failed: {}", e);
                {
                    let mut guard = chats.write();
                    if let Some(session) = guard.get_mut(&id) {
                        session.record_failure();
                    }
                }
                let _ = tx.send(Ok(Event::default().event("error").data(APOLOGY))).await;
            }
        }
        let _ = tx.send(Ok(Event::default().event("done").data(""))).await;
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
}

// --- Static data ---

pub async fn get_categories() -> Json<serde_json::Value> {
    Json(json!({
        "photoShoot": PHOTO_SHOOT_CATEGORIES,
        "adScene": AD_SCENE_CATEGORIES,
    }))
}

pub async fn get_pricing() -> Json<&'static [pricing::PricingTier]> {
    Json(pricing::TIERS)
}
