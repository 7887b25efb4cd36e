use base64::Engine;
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("could not read image data: {0}")]
    Unreadable(String),
    #[error("malformed data URL")]
    MalformedInput,
}

/// An image held as a base64 payload plus its MIME type: the raw payload
/// goes to the generation service, the self-describing data URL to display
/// and handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    base64: String,
    mime_type: String,
}

impl Asset {
    /// Builds an asset from raw bytes, deriving the MIME type from the
    /// payload's magic numbers.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let format = image::guess_format(bytes).map_err(|e| AssetError::Unreadable(e.to_string()))?;
        Ok(Self {
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: format.to_mime_type().to_string(),
        })
    }

    pub fn from_base64(payload: &str, mime_type: &str) -> Result<Self, AssetError> {
        if mime_type.is_empty() {
            return Err(AssetError::MalformedInput);
        }
        Ok(Self {
            base64: payload.trim().to_string(),
            mime_type: mime_type.to_string(),
        })
    }

    pub fn from_data_url(url: &str) -> Result<Self, AssetError> {
        let (base64, mime_type) = split_data_url(url)?;
        Ok(Self { base64, mime_type })
    }

    /// Decodes the payload and sniffs its format, so an unreadable upload is
    /// rejected before it reaches any stage.
    pub fn validate(&self) -> Result<(), AssetError> {
        let bytes = self.bytes()?;
        image::guess_format(&bytes).map_err(|e| AssetError::Unreadable(e.to_string()))?;
        Ok(())
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> Result<Vec<u8>, AssetError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.base64)
            .map_err(|e| AssetError::Unreadable(e.to_string()))
    }
}

// On the wire an asset is just its data URL.
impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.data_url())
    }
}

/// Decomposes `data:<mime>;base64,<payload>` into its payload and MIME
/// segments. Anything that does not match that shape is `MalformedInput`.
pub fn split_data_url(url: &str) -> Result<(String, String), AssetError> {
    let rest = url.strip_prefix("data:").ok_or(AssetError::MalformedInput)?;
    let (meta, payload) = rest.split_once(',').ok_or(AssetError::MalformedInput)?;
    let mime_type = meta.strip_suffix(";base64").ok_or(AssetError::MalformedInput)?;
    if mime_type.is_empty() || payload.is_empty() {
        return Err(AssetError::MalformedInput);
    }
    Ok((payload.to_string(), mime_type.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // PNG magic followed by filler; guess_format only needs the signature.
    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n00000000";

    #[test]
    fn round_trips_bytes_through_data_url() {
        let asset = Asset::from_bytes(PNG_BYTES).unwrap();
        assert_eq!(asset.mime_type(), "image/png");
        let reparsed = Asset::from_data_url(&asset.data_url()).unwrap();
        assert_eq!(reparsed, asset);
        assert_eq!(reparsed.bytes().unwrap(), PNG_BYTES);
    }

    #[test]
    fn rejects_bytes_with_no_recognizable_format() {
        assert!(matches!(Asset::from_bytes(b"not an image"), Err(AssetError::Unreadable(_))));
    }

    #[test]
    fn splits_well_formed_data_url() {
        let (payload, mime) = split_data_url("data:image/jpeg;base64,AAAA").unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(payload, "AAAA");
    }

    #[test]
    fn rejects_malformed_data_urls() {
        for bad in [
            "image/png;base64,AAAA",   // missing scheme
            "data:image/png;base64",   // no payload segment
            "data:image/png,AAAA",     // not base64-encoded
            "data:;base64,AAAA",       // empty MIME segment
            "data:image/png;base64,",  // empty payload
        ] {
            assert!(matches!(split_data_url(bad), Err(AssetError::MalformedInput)), "accepted {bad:?}");
        }
    }

    #[test]
    fn validate_catches_undecodable_payloads() {
        let asset = Asset::from_base64("!!!not-base64!!!", "image/png").unwrap();
        assert!(matches!(asset.validate(), Err(AssetError::Unreadable(_))));
    }
}
