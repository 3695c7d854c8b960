//! Data models and structures
//!
//! Defines the request/response types exchanged with the image model, the
//! table-designer selection types, and environment configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Browser origins allowed to call the HTTP API when `ALLOWED_ORIGINS` is unset.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "https://rauw.nl",
    "https://www.rauw.nl",
    "http://localhost:3000",
];

/// Maximum number of images a single generation request may carry.
pub const MAX_IMAGES: usize = 5;

/// Number of legs the generated table must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegCount {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
}

impl LegCount {
    pub const ALL: [LegCount; 3] = [LegCount::Two, LegCount::Three, LegCount::Four];

    pub fn count(self) -> u8 {
        match self {
            LegCount::Two => 2,
            LegCount::Three => 3,
            LegCount::Four => 4,
        }
    }

    /// Parse an optional leg-count field. Blank input means unconstrained.
    pub fn parse_optional(input: &str) -> Result<Option<Self>> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }
}

impl FromStr for LegCount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "2" => Ok(LegCount::Two),
            "3" => Ok(LegCount::Three),
            "4" => Ok(LegCount::Four),
            other => Err(Error::InvalidInput(format!(
                "Invalid leg count '{}'. Must be one of: 2, 3, 4",
                other
            ))),
        }
    }
}

impl fmt::Display for LegCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count())
    }
}

/// Which instruction template a table request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Shape, base and finish combined into a generic showroom scene.
    ShapeBaseFinish,
    /// Shape, base and finish combined, then placed into a room photo (image 4).
    ShapeBaseFinishRoom,
}

impl RequestMode {
    pub fn image_count(self) -> usize {
        match self {
            RequestMode::ShapeBaseFinish => 3,
            RequestMode::ShapeBaseFinishRoom => 4,
        }
    }
}

/// Catalog categories of reference images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "vorm")]
    Shape,
    #[serde(rename = "onderstel")]
    Base,
    #[serde(rename = "kleur")]
    Finish,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Shape, Category::Base, Category::Finish];

    /// Directory (and URL segment) holding this category's images.
    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Shape => "vorm",
            Category::Base => "onderstel",
            Category::Finish => "kleur",
        }
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vorm" | "shape" => Ok(Category::Shape),
            "onderstel" | "base" => Ok(Category::Base),
            "kleur" | "finish" => Ok(Category::Finish),
            _ => Err(Error::InvalidInput(format!(
                "Invalid category. Must be one of: {}",
                Category::ALL
                    .iter()
                    .map(|c| c.dir_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A caller-supplied image: its source name (used for MIME inference) and bytes.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file fully. The handle is closed before this returns.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            tracing::error!("Failed to read image {}: {}", path.display(), e);
            e
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::InvalidInput(format!("Invalid image path: {}", path.display()))
            })?
            .to_string();
        Ok(Self { name, bytes })
    }
}

/// The three catalog picks plus an optional room photo and leg constraint.
#[derive(Debug, Clone)]
pub struct TableSelection {
    pub shape: SourceImage,
    pub base: SourceImage,
    pub finish: SourceImage,
    pub room: Option<SourceImage>,
    pub legs: Option<LegCount>,
}

impl TableSelection {
    pub fn mode(&self) -> RequestMode {
        match self.room {
            Some(_) => RequestMode::ShapeBaseFinishRoom,
            None => RequestMode::ShapeBaseFinish,
        }
    }

    /// Images in the positional order the instruction text refers to.
    pub fn into_images(self) -> Vec<SourceImage> {
        let mut images = vec![self.shape, self.base, self.finish];
        images.extend(self.room);
        images
    }
}

/// One input image as sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePart {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Ordered image parts followed by exactly one instruction text.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub images: Vec<ImagePart>,
    pub instruction: String,
}

impl GenerationRequest {
    /// Image parts plus the trailing instruction part.
    pub fn part_count(&self) -> usize {
        self.images.len() + 1
    }
}

/// One part of a streamed response chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    Image { data: Vec<u8>, mime_type: String },
    Text(String),
}

/// One unit of a streamed response. May carry no parts at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseChunk {
    pub parts: Vec<ResponsePart>,
}

impl ResponseChunk {
    pub fn new(parts: Vec<ResponsePart>) -> Self {
        Self { parts }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Successful generation: at least one artifact was written.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub artifacts: Vec<String>,
    pub texts: Vec<String>,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub image_model: String,
    pub output_dir: PathBuf,
    pub catalog_dir: PathBuf,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                Error::Configuration(format!("MAX_UPLOAD_BYTES must be a number, got '{}'", raw))
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        // Comma separated; an empty list disables cross-origin access.
        let allowed_origins = match lookup("ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|key| !key.trim().is_empty()),
            image_model: lookup("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            catalog_dir: lookup("CATALOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            max_upload_bytes,
            allowed_origins,
        })
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            Error::Configuration("GEMINI_API_KEY environment variable not set".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_leg_count_parsing() {
        assert_eq!("2".parse::<LegCount>().unwrap(), LegCount::Two);
        assert_eq!(" 4 ".parse::<LegCount>().unwrap(), LegCount::Four);
        assert!(matches!(
            "5".parse::<LegCount>().unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(matches!(
            "four".parse::<LegCount>().unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn test_leg_count_optional_blank_is_none() {
        assert_eq!(LegCount::parse_optional("").unwrap(), None);
        assert_eq!(LegCount::parse_optional("  ").unwrap(), None);
        assert_eq!(LegCount::parse_optional("3").unwrap(), Some(LegCount::Three));
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("vorm".parse::<Category>().unwrap(), Category::Shape);
        assert_eq!("finish".parse::<Category>().unwrap(), Category::Finish);
        let err = "tafelblad".parse::<Category>().unwrap_err();
        assert!(err.to_string().contains("vorm, onderstel, kleur"));
    }

    #[test]
    fn test_selection_mode_follows_room() {
        let img = |n: &str| SourceImage::new(n, vec![1]);
        let mut selection = TableSelection {
            shape: img("rond.jpeg"),
            base: img("poot.png"),
            finish: img("eiken.jpg"),
            room: None,
            legs: None,
        };
        assert_eq!(selection.mode(), RequestMode::ShapeBaseFinish);
        assert_eq!(selection.clone().into_images().len(), 3);

        selection.room = Some(img("kamer.jpg"));
        assert_eq!(selection.mode(), RequestMode::ShapeBaseFinishRoom);
        let names: Vec<String> = selection.into_images().into_iter().map(|i| i.name).collect();
        assert_eq!(names, ["rond.jpeg", "poot.png", "eiken.jpg", "kamer.jpg"]);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.allowed_origins, DEFAULT_ALLOWED_ORIGINS.to_vec());
        assert!(matches!(
            config.require_api_key().unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[test]
    fn test_config_blank_key_is_missing() {
        let config = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", " ")])).unwrap();
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            ("MAX_UPLOAD_BYTES", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.require_api_key().unwrap(), "secret");
        assert_eq!(config.image_model, "gemini-2.5-flash-image");
        assert_eq!(config.max_upload_bytes, 1024);
    }

    #[test]
    fn test_config_rejects_malformed_upload_limit() {
        let err = Config::from_lookup(lookup_from(&[("MAX_UPLOAD_BYTES", "lots")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_config_allowed_origins_list() {
        let config = Config::from_lookup(lookup_from(&[(
            "ALLOWED_ORIGINS",
            " https://shop.rauw.nl, ,http://localhost:5173 ",
        )]))
        .unwrap();
        assert_eq!(
            config.allowed_origins,
            vec!["https://shop.rauw.nl", "http://localhost:5173"]
        );

        let config = Config::from_lookup(lookup_from(&[("ALLOWED_ORIGINS", "")])).unwrap();
        assert!(config.allowed_origins.is_empty());
    }
}
