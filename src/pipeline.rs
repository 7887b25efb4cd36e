use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::assets::Asset;
use crate::assistant::{PromptAssistant, SelectionError};
use crate::gemini::InlineImage;
use crate::history::History;
use crate::models::{GenerationResult, Selections};
use crate::prompts::{
    ad_scene_prompt, photo_shoot_prompt, AD_SCENE_CATEGORIES, DEFAULT_VIDEO_PROMPT,
    PHOTO_SHOOT_CATEGORIES,
};

pub const PRODUCT_DOWNLOAD_NAME: &str = "jenga-biashara-product.png";
pub const AD_DOWNLOAD_NAME: &str = "jenga-biashara-ad.png";
pub const VIDEO_DOWNLOAD_NAME: &str = "jenga-biashara-commercial.mp4";

// Precondition messages, surfaced verbatim to the user.
pub const ERR_NO_PRODUCT: &str = "Please upload a product image first.";
pub const ERR_NO_CONSENT: &str = "You must confirm you have consent to use the model's photo.";
pub const ERR_NO_HANDOFF: &str = "Missing the image from the Photo Shoot step.";
pub const ERR_NO_DESCRIPTION: &str = "Please describe your product.";
pub const ERR_NO_PROMPT: &str = "Please compose a prompt.";
pub const ERR_NO_VIDEO_PROMPT: &str = "Please enter a prompt.";

// Generic per-stage failure messages; the underlying cause goes to the log.
pub const ERR_PHOTO_SHOOT_FAILED: &str = "Failed to generate image. This can sometimes happen \
    with complex edits. Try simplifying your prompt or using a different background.";
pub const ERR_AD_FAILED: &str = "Failed to generate ad image. This can sometimes happen with \
    very complex scenes. Try simplifying your vision.";
pub const ERR_VIDEO_FAILED: &str = "Failed to generate video. Please try again.";
pub const ERR_KEY_NOT_FOUND: &str = "API Key not found. Please select your key again.";
pub const ERR_UNREADABLE_FILE: &str = "Could not read the selected file. Please try another image.";
pub const ERR_UNREADABLE_MODEL: &str = "Could not read the model's photo.";

/// Shown by the ad campaign stage while no photoshoot result exists.
pub const AD_LOCKED_MESSAGE: &str = "Please go to the \"Photo Studio\" tab first to generate a \
    base image of your product on a model.";

const MODEL_PHOTO_LOCK_REASON: &str = "Using your uploaded model photo.";
const MODEL_PHOTO_LOCKED_KEYS: &[&str] = &["model", "ethnicity", "bodyArchetype"];

/// Cycled while a video render is in flight.
pub const VIDEO_WORKING_MESSAGES: &[&str] = &[
    "Warming up the digital director's chair...",
    "Choreographing pixels into motion...",
    "Rendering your vision, frame by frame...",
    "This can take a few minutes, good things come to those who wait!",
    "Finalizing the cut, adding the polish...",
];
pub const VIDEO_WORKING_MESSAGE_INTERVAL: Duration = Duration::from_secs(4);

/// A prepared image-generation request: inline inputs plus the instruction.
#[derive(Debug, Clone)]
pub struct ImagePlan {
    pub images: Vec<InlineImage>,
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub struct VideoPlan {
    pub prompt: String,
    pub seed: Option<InlineImage>,
}

fn inline(asset: &Asset) -> InlineImage {
    InlineImage {
        data: asset.base64().to_string(),
        mime_type: asset.mime_type().to_string(),
    }
}

/// Stage 1: turns an uploaded product photo into a professional shoot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioStage {
    pub product: Option<Asset>,
    pub model_photo: Option<Asset>,
    pub has_consent: bool,
    pub assistant: PromptAssistant,
    pub history: History,
    pub error: Option<String>,
    pub submitting: bool,
}

impl StudioStage {
    fn new() -> Self {
        let mut stage = Self {
            product: None,
            model_photo: None,
            has_consent: false,
            assistant: PromptAssistant::new(PHOTO_SHOOT_CATEGORIES),
            history: History::default(),
            error: None,
            submitting: false,
        };
        stage.recompose();
        stage
    }

    /// Installs a freshly decoded product photo, resetting any prior result,
    /// history and error for this stage.
    pub fn load_product(&mut self, asset: Asset) {
        self.history.clear();
        self.error = None;
        self.product = Some(asset);
    }

    /// Installs a model photo. Consent is reset on every new photo and must
    /// be re-granted before the photo can be used.
    pub fn load_model_photo(&mut self, asset: Asset) {
        self.model_photo = Some(asset);
        self.has_consent = false;
        self.assistant.set_disabled(MODEL_PHOTO_LOCKED_KEYS, MODEL_PHOTO_LOCK_REASON);
        self.recompose();
    }

    pub fn set_consent(&mut self, granted: bool) {
        self.has_consent = granted;
    }

    pub fn select(&mut self, key: &str, value: &str) -> Result<(), SelectionError> {
        self.assistant.select(key, value)?;
        self.recompose();
        Ok(())
    }

    fn recompose(&mut self) {
        let has_model_photo = self.model_photo.is_some();
        self.assistant.compose_with(|s| photo_shoot_prompt(s, has_model_photo));
    }

    /// Validates preconditions and assembles the generation request. The
    /// prompt is re-derived from the selections here: attaching a model
    /// photo switches the template branch regardless of manual edits.
    pub fn prepare_submit(&mut self) -> Result<ImagePlan, &'static str> {
        let Some(product) = &self.product else {
            return Err(ERR_NO_PRODUCT);
        };
        if self.model_photo.is_some() && !self.has_consent {
            return Err(ERR_NO_CONSENT);
        }
        let mut images = vec![inline(product)];
        if let Some(model_photo) = &self.model_photo {
            images.push(inline(model_photo));
        }
        self.recompose();
        Ok(ImagePlan {
            images,
            prompt: self.assistant.prompt().to_string(),
        })
    }

    pub fn record_success(&mut self, image_base64: &str) {
        self.history.record(format!("data:image/png;base64,{image_base64}"));
        self.error = None;
    }

    pub fn record_failure(&mut self) {
        self.error = Some(ERR_PHOTO_SHOOT_FAILED.to_string());
    }
}

/// Stage 2: places the photoshoot subject into an advertising scene.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdStage {
    pub product_description: String,
    pub assistant: PromptAssistant,
    pub history: History,
    pub error: Option<String>,
    pub submitting: bool,
}

impl AdStage {
    fn new() -> Self {
        let mut stage = Self {
            product_description: "dress".to_string(),
            assistant: PromptAssistant::new(AD_SCENE_CATEGORIES),
            history: History::default(),
            error: None,
            submitting: false,
        };
        stage.recompose();
        stage
    }

    pub fn set_description(&mut self, description: String) {
        self.product_description = description;
        self.recompose();
    }

    pub fn select(&mut self, key: &str, value: &str) -> Result<(), SelectionError> {
        self.assistant.select(key, value)?;
        self.recompose();
        Ok(())
    }

    fn recompose(&mut self) {
        let description = self.product_description.clone();
        self.assistant.compose_with(|s| ad_scene_prompt(s, &description));
    }

    /// Re-merges upstream selections over the stage defaults and overwrites
    /// the derived prompt.
    fn reseed(&mut self, upstream: &Selections) {
        self.assistant.reseed(upstream);
        self.recompose();
    }

    /// Validates preconditions against the handoff snapshot and assembles
    /// the request. Unlike the studio, the ad stage submits the current
    /// prompt, manual edits included.
    pub fn prepare_submit(&self, handoff: Option<&GenerationResult>) -> Result<ImagePlan, &'static str> {
        let Some(handoff) = handoff else {
            return Err(ERR_NO_HANDOFF);
        };
        if self.product_description.trim().is_empty() {
            return Err(ERR_NO_DESCRIPTION);
        }
        if self.assistant.prompt().trim().is_empty() {
            return Err(ERR_NO_PROMPT);
        }
        let base = Asset::from_data_url(&handoff.image_url).map_err(|_| ERR_UNREADABLE_FILE)?;
        Ok(ImagePlan {
            images: vec![inline(&base)],
            prompt: self.assistant.prompt().to_string(),
        })
    }

    pub fn record_success(&mut self, image_base64: &str) {
        self.history.record(format!("data:image/png;base64,{image_base64}"));
        self.error = None;
    }

    pub fn record_failure(&mut self) {
        self.error = Some(ERR_AD_FAILED.to_string());
    }
}

fn serialize_present<S: Serializer>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_bool(value.is_some())
}

/// Stage 3: animates the photoshoot result into a short commercial.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStage {
    pub prompt: String,
    /// Seed uploaded by the user; takes precedence over the handoff image.
    pub seed_upload: Option<Asset>,
    /// Seed propagated from the photoshoot result.
    pub seed_handoff: Option<Asset>,
    #[serde(rename = "videoReady", serialize_with = "serialize_present")]
    pub video: Option<Bytes>,
    pub error: Option<String>,
    pub submitting: bool,
    pub working_message: Option<String>,
}

impl VideoStage {
    fn new() -> Self {
        Self {
            prompt: DEFAULT_VIDEO_PROMPT.to_string(),
            seed_upload: None,
            seed_handoff: None,
            video: None,
            error: None,
            submitting: false,
            working_message: None,
        }
    }

    pub fn seed(&self) -> Option<&Asset> {
        self.seed_upload.as_ref().or(self.seed_handoff.as_ref())
    }

    pub fn prepare_submit(&self) -> Result<VideoPlan, &'static str> {
        if self.prompt.trim().is_empty() {
            return Err(ERR_NO_VIDEO_PROMPT);
        }
        Ok(VideoPlan {
            prompt: self.prompt.clone(),
            seed: self.seed().map(inline),
        })
    }

    pub fn record_success(&mut self, video: Bytes) {
        self.video = Some(video);
        self.error = None;
    }

    pub fn record_failure(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }
}

/// Which downstream stages are currently usable, derived from pipeline state
/// rather than inferred ad hoc by the client.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub ad_campaign: bool,
    pub video_commercial: bool,
}

/// One user's three-stage pipeline plus the handoff snapshot between stages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSession {
    pub id: Uuid,
    pub studio: StudioStage,
    pub ad: AdStage,
    pub video: VideoStage,
    /// Snapshot of the studio's active result, copied by value on handoff.
    pub photo_shoot_result: Option<GenerationResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            studio: StudioStage::new(),
            ad: AdStage::new(),
            video: VideoStage::new(),
            photo_shoot_result: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        let unlocked = self.photo_shoot_result.is_some();
        Capabilities {
            ad_campaign: unlocked,
            video_commercial: unlocked,
        }
    }

    /// Eager handoff: whatever is currently active in the studio (after a
    /// generation or an undo/redo) becomes the downstream stages' input.
    /// The snapshot owns its own copy of the selections.
    pub fn propagate_from_studio(&mut self) {
        let Some(image_url) = self.studio.history.active().map(str::to_string) else {
            return;
        };
        let snapshot = GenerationResult {
            image_url,
            selections: self.studio.assistant.selections().clone(),
        };
        self.ad.reseed(&snapshot.selections);
        if let Ok(seed) = Asset::from_data_url(&snapshot.image_url) {
            self.video.seed_handoff = Some(seed);
        }
        self.photo_shoot_result = Some(snapshot);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n00000000";

    fn png_asset() -> Asset {
        Asset::from_bytes(PNG_BYTES).unwrap()
    }

    #[test]
    fn studio_submit_requires_a_product_image() {
        let mut session = PipelineSession::new();
        assert_eq!(session.studio.prepare_submit().unwrap_err(), ERR_NO_PRODUCT);

        session.studio.load_product(png_asset());
        let plan = session.studio.prepare_submit().unwrap();
        assert_eq!(plan.images.len(), 1);
        assert!(plan.prompt.contains("Generate a full-body image"));
    }

    #[test]
    fn new_model_photo_resets_consent_until_regranted() {
        let mut session = PipelineSession::new();
        session.studio.load_product(png_asset());

        session.studio.load_model_photo(png_asset());
        session.studio.set_consent(true);
        assert!(session.studio.prepare_submit().is_ok());

        // A replacement photo revokes the earlier consent.
        session.studio.load_model_photo(png_asset());
        assert!(!session.studio.has_consent);
        assert_eq!(session.studio.prepare_submit().unwrap_err(), ERR_NO_CONSENT);

        session.studio.set_consent(true);
        let plan = session.studio.prepare_submit().unwrap();
        assert_eq!(plan.images.len(), 2);
        assert!(plan.prompt.contains("Composite the two input images"));
    }

    #[test]
    fn model_photo_locks_the_model_description_selectors() {
        let mut session = PipelineSession::new();
        session.studio.load_model_photo(png_asset());

        assert!(session.studio.select("ethnicity", "East African").is_err());
        assert!(session.studio.select("background", "Beach setting").is_ok());
    }

    #[test]
    fn downstream_stages_are_locked_until_the_studio_produces_a_result() {
        let session = PipelineSession::new();
        let caps = session.capabilities();
        assert!(!caps.ad_campaign);
        assert!(!caps.video_commercial);
        assert_eq!(session.ad.prepare_submit(None).unwrap_err(), ERR_NO_HANDOFF);
    }

    #[test]
    fn handoff_snapshot_is_a_value_copy() {
        let mut session = PipelineSession::new();
        session.studio.load_product(png_asset());
        session.studio.select("background", "Urban cityscape").unwrap();
        session.studio.record_success("Zmlyc3Q=");
        session.propagate_from_studio();

        let caps = session.capabilities();
        assert!(caps.ad_campaign && caps.video_commercial);
        let handed = session.photo_shoot_result.clone().unwrap();
        assert_eq!(handed.selections["background"], "Urban cityscape");

        // Mutating the studio's selections afterwards must not reach the
        // snapshot until the next active-asset change re-propagates.
        session.studio.select("background", "Beach setting").unwrap();
        assert_eq!(
            session.photo_shoot_result.as_ref().unwrap().selections["background"],
            "Urban cityscape"
        );
    }

    #[test]
    fn undo_and_redo_repropagate_the_active_asset() {
        let mut session = PipelineSession::new();
        session.studio.load_product(png_asset());
        session.studio.record_success("Zmlyc3Q=");
        session.propagate_from_studio();
        session.studio.record_success("c2Vjb25k");
        session.propagate_from_studio();
        let second = session.photo_shoot_result.as_ref().unwrap().image_url.clone();

        session.studio.history.undo();
        session.propagate_from_studio();
        let first = session.photo_shoot_result.as_ref().unwrap().image_url.clone();
        assert_ne!(first, second);

        session.studio.history.redo();
        session.propagate_from_studio();
        assert_eq!(session.photo_shoot_result.as_ref().unwrap().image_url, second);
    }

    #[test]
    fn handoff_reseeds_the_ad_assistant_and_video_seed() {
        let mut session = PipelineSession::new();
        session.studio.load_product(png_asset());
        session.studio.select("ethnicity", "North African").unwrap();
        session.studio.record_success("Zmlyc3Q=");
        session.propagate_from_studio();

        assert_eq!(session.ad.assistant.selections()["ethnicity"], "North African");
        // Ad-only categories keep their defaults.
        assert_eq!(session.ad.assistant.selections()["style"], "Modern City");
        assert!(session.video.seed().is_some());

        // An uploaded seed takes precedence over the propagated one.
        session.video.seed_upload = Some(png_asset());
        assert_eq!(session.video.seed(), session.video.seed_upload.as_ref());
    }

    #[test]
    fn ad_submit_validates_description_and_prompt() {
        let mut session = PipelineSession::new();
        session.studio.load_product(png_asset());
        session.studio.record_success("Zmlyc3Q=");
        session.propagate_from_studio();

        session.ad.set_description("  ".into());
        let handoff = session.photo_shoot_result.clone();
        assert_eq!(session.ad.prepare_submit(handoff.as_ref()).unwrap_err(), ERR_NO_DESCRIPTION);

        session.ad.set_description("a vibrant kitenge print dress".into());
        session.ad.assistant.override_prompt(String::new());
        assert_eq!(session.ad.prepare_submit(handoff.as_ref()).unwrap_err(), ERR_NO_PROMPT);

        session.ad.select("style", "Lush Nature").unwrap();
        let plan = session.ad.prepare_submit(handoff.as_ref()).unwrap();
        assert!(plan.prompt.contains("Lush Nature"));
        assert!(plan.prompt.contains("a vibrant kitenge print dress"));
    }

    #[test]
    fn video_submit_requires_a_prompt() {
        let mut session = PipelineSession::new();
        session.video.prompt = "   ".into();
        assert_eq!(session.video.prepare_submit().unwrap_err(), ERR_NO_VIDEO_PROMPT);

        session.video.prompt = DEFAULT_VIDEO_PROMPT.to_string();
        let plan = session.video.prepare_submit().unwrap();
        assert!(plan.seed.is_none());
        assert_eq!(plan.prompt, DEFAULT_VIDEO_PROMPT);
    }

    #[test]
    fn generation_failure_leaves_history_untouched() {
        let mut session = PipelineSession::new();
        session.studio.load_product(png_asset());
        session.studio.record_success("Zmlyc3Q=");
        let before = session.studio.history.len();

        session.studio.record_failure();
        assert_eq!(session.studio.history.len(), before);
        assert_eq!(session.studio.error.as_deref(), Some(ERR_PHOTO_SHOOT_FAILED));

        // The next successful attempt clears the error.
        session.studio.record_success("c2Vjb25k");
        assert!(session.studio.error.is_none());
    }
}
