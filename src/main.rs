mod assets;
mod assistant;
mod chat;
mod error;
mod gemini;
mod history;
mod models;
mod pipeline;
mod pricing;
mod prompts;
mod routes;

use axum::routing::{get, post, put};
use axum::Router;
use routes::{
    ad_description, ad_download, ad_prompt, ad_redo, ad_select, ad_undo, create_chat,
    create_session, generate_ad_scene, generate_photo_shoot, generate_video_commercial,
    get_categories, get_chat, get_pricing, get_session, get_video_credential,
    select_video_credential, send_chat_message, set_consent, studio_download, studio_prompt,
    studio_redo, studio_select, studio_undo, upload_model_photo, upload_product, video_download,
    video_prompt, video_seed, AppState,
};
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::gemini::GeminiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| "DEMO_KEY".into());
    tracing::info!("Using API key: {}...", &api_key[..std::cmp::min(10, api_key.len())]);
    let video_api_key = std::env::var("VEO_API_KEY").ok().filter(|v| !v.trim().is_empty());

    let client = GeminiClient::new(api_key, video_api_key);
    let video_key_available = client.has_video_key();
    let state = AppState {
        sessions: Arc::default(),
        chats: Arc::default(),
        backend: Arc::new(client),
        video_key_selected: Arc::new(AtomicBool::new(false)),
        video_key_available,
    };

    let app = Router::new()
        .route("/api/session", post(create_session))
        .route("/api/session/:id", get(get_session))
        .route("/api/session/:id/studio/product", post(upload_product))
        .route("/api/session/:id/studio/model", post(upload_model_photo))
        .route("/api/session/:id/studio/consent", post(set_consent))
        .route("/api/session/:id/studio/select", post(studio_select))
        .route("/api/session/:id/studio/prompt", put(studio_prompt))
        .route("/api/session/:id/studio/generate", post(generate_photo_shoot))
        .route("/api/session/:id/studio/undo", post(studio_undo))
        .route("/api/session/:id/studio/redo", post(studio_redo))
        .route("/api/session/:id/studio/download", get(studio_download))
        .route("/api/session/:id/ad/description", put(ad_description))
        .route("/api/session/:id/ad/select", post(ad_select))
        .route("/api/session/:id/ad/prompt", put(ad_prompt))
        .route("/api/session/:id/ad/generate", post(generate_ad_scene))
        .route("/api/session/:id/ad/undo", post(ad_undo))
        .route("/api/session/:id/ad/redo", post(ad_redo))
        .route("/api/session/:id/ad/download", get(ad_download))
        .route("/api/session/:id/video/prompt", put(video_prompt))
        .route("/api/session/:id/video/seed", post(video_seed))
        .route("/api/session/:id/video/generate", post(generate_video_commercial))
        .route("/api/session/:id/video/download", get(video_download))
        .route("/api/credentials/video", get(get_video_credential))
        .route("/api/credentials/video/select", post(select_video_credential))
        .route("/api/chat", post(create_chat))
        .route("/api/chat/:id", get(get_chat))
        .route("/api/chat/:id/message", post(send_chat_message))
        .route("/api/categories", get(get_categories))
        .route("/api/pricing", get(get_pricing))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting server");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
