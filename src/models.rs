use base64::Engine;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

use crate::assets::{Asset, AssetError};

/// Category key -> chosen value. Every category declared by a stage's
/// template has an entry; the value is either one of the enumerated options
/// or, for allow-custom categories, a caller-supplied string.
pub type Selections = BTreeMap<String, String>;

/// The unit handed from one pipeline stage to the next. Copied by value on
/// handoff so downstream mutation never reaches the upstream record.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub image_url: String,
    pub selections: Selections,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

/// Body for the asset-upload endpoints. Browse, drag-and-drop and clipboard
/// paste all land here: either a full `data:` URL or a raw base64 payload
/// with its MIME type.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl UploadRequest {
    pub fn into_asset(self) -> Result<Asset, AssetError> {
        let asset = match (self.data_url, self.data, self.mime_type) {
            (Some(url), _, _) => Asset::from_data_url(&url)?,
            (None, Some(data), Some(mime_type)) => Asset::from_base64(&data, &mime_type)?,
            // No MIME type supplied: sniff it from the payload.
            (None, Some(data), None) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(data.trim())
                    .map_err(|e| AssetError::Unreadable(e.to_string()))?;
                Asset::from_bytes(&bytes)?
            }
            _ => return Err(AssetError::MalformedInput),
        };
        asset.validate()?;
        Ok(asset)
    }
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    pub granted: bool,
}

#[derive(Debug, Deserialize)]
pub struct DescriptionRequest {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatSendRequest {
    pub text: String,
}
