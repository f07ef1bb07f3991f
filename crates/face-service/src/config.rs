use crate::error::ConfigError;
use anyhow::{Context, Result};
use common::validation::{
    slugify, validate_duration_secs, validate_id, validate_name, validate_path_components,
    validate_range, validate_uri,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8090";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 90.0;
/// Matches requested per search call
pub const DEFAULT_MAX_FACES: i32 = 3;
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_MQTT_TOPIC_PREFIX: &str = "homeassistant/event";
pub const DEFAULT_EVENT_HISTORY: usize = 100;

/// Regions where Rekognition face collections are available
pub const SUPPORTED_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-west-1",
    "eu-central-1",
    "eu-west-2",
    "eu-west-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-2",
    "ap-northeast-1",
    "ap-south-1",
    "sa-east-1",
];

/// Image format used for saved snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SaveFileFormat {
    #[default]
    Jpg,
    Png,
}

impl SaveFileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            Self::Jpg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

impl FromStr for SaveFileFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            other => Err(ConfigError::invalid(
                "SAVE_FILE_FORMAT",
                format!("expected jpg or png, got '{}'", other),
            )),
        }
    }
}

/// Which backend answers face searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    Rekognition,
    /// Scripted in-process backend for local development
    Mock,
}

impl FromStr for SearchProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rekognition" | "aws" => Ok(Self::Rekognition),
            "mock" => Ok(Self::Mock),
            other => Err(ConfigError::invalid(
                "FACE_SEARCH_PROVIDER",
                format!("expected rekognition or mock, got '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsSettings {
    #[serde(default = "default_region")]
    pub region: String,

    /// Static credentials; the default AWS provider chain is used when absent
    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default)]
    pub provider: SearchProvider,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            provider: SearchProvider::default(),
        }
    }
}

/// Settings of the face search itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionSettings {
    /// Rekognition collection searched for every frame
    pub collection_id: String,

    /// Minimum similarity (0-100) for a match to be reported
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_max_faces")]
    pub max_faces: i32,

    /// Annotated image saving; disabled when absent
    #[serde(default)]
    pub save: Option<SaveSettings>,
}

impl RecognitionSettings {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_faces: DEFAULT_MAX_FACES,
            save: None,
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_id(&self.collection_id, "collection_id")?;
        validate_range(self.similarity_threshold, 0.0, 100.0, "similarity_threshold")?;
        validate_range(self.max_faces, 1, 4096, "max_faces")?;
        if let Some(save) = &self.save {
            validate_path_components(&save.folder, "save_file_folder")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSettings {
    pub folder: PathBuf,

    #[serde(default)]
    pub format: SaveFileFormat,

    /// Also keep a timestamped copy of frames with matches
    #[serde(default)]
    pub save_timestamped_file: bool,

    /// Write the latest snapshot even when nothing matched
    #[serde(default)]
    pub always_save_latest_file: bool,

    #[serde(default = "default_true")]
    pub show_boxes: bool,

    /// TrueType font for box labels; well-known system fonts are tried otherwise
    #[serde(default)]
    pub label_font_path: Option<PathBuf>,
}

impl SaveSettings {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            format: SaveFileFormat::default(),
            save_timestamped_file: false,
            always_save_latest_file: false,
            show_boxes: true,
            label_font_path: None,
        }
    }
}

/// One camera whose frames are processed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Camera entity id, e.g. `camera.front_door`
    pub camera_entity: String,

    /// Display name; defaults to `rekognition_face_{camera object id}`
    #[serde(default)]
    pub name: Option<String>,

    /// Still image URL polled every scan interval
    #[serde(default)]
    pub snapshot_url: Option<String>,
}

impl SourceConfig {
    pub fn new(camera_entity: impl Into<String>) -> Self {
        Self {
            camera_entity: camera_entity.into(),
            name: None,
            snapshot_url: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Object id part of the camera entity (`camera.front_door` -> `front_door`)
    pub fn camera_object_id(&self) -> &str {
        self.camera_entity
            .split_once('.')
            .map(|(_, object_id)| object_id)
            .unwrap_or(&self.camera_entity)
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("rekognition_face_{}", self.camera_object_id()))
    }

    /// Slug used in URLs and saved file names
    pub fn source_id(&self) -> String {
        slugify(&self.display_name())
    }

    /// Parse `camera.entity[=Name][@snapshot_url]`
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let (head, snapshot_url) = match spec.split_once('@') {
            Some((head, url)) => (head, Some(url.trim().to_string())),
            None => (spec, None),
        };
        let (camera_entity, name) = match head.split_once('=') {
            Some((entity, name)) => (entity.trim(), Some(name.trim().to_string())),
            None => (head.trim(), None),
        };

        if camera_entity.is_empty() {
            return Err(ConfigError::invalid(
                "FACE_SOURCES",
                format!("missing camera entity in '{}'", spec),
            ));
        }

        Ok(Self {
            camera_entity: camera_entity.to_string(),
            name: name.filter(|n| !n.is_empty()),
            snapshot_url: snapshot_url.filter(|u| !u.is_empty()),
        })
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.camera_entity, "camera_entity")?;
        validate_name(&self.display_name(), "name")?;
        if self.source_id().is_empty() {
            anyhow::bail!(
                "source name '{}' does not contain any letters or digits",
                self.display_name()
            );
        }
        if let Some(url) = &self.snapshot_url {
            validate_uri(url, "snapshot_url")?;
        }
        Ok(())
    }
}

/// Where `rekognition.face_recognised` events are delivered besides the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// POST target; `{event_type}` is replaced with the event name
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Bearer token sent with webhook requests
    #[serde(default)]
    pub webhook_token: Option<String>,

    #[serde(default)]
    pub mqtt_broker: Option<String>,

    #[serde(default = "default_topic_prefix")]
    pub mqtt_topic_prefix: String,

    #[serde(default)]
    pub mqtt_username: Option<String>,

    #[serde(default)]
    pub mqtt_password: Option<String>,

    /// Events kept in memory for `GET /v1/events`
    #[serde(default = "default_event_history")]
    pub history_size: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_token: None,
            mqtt_broker: None,
            mqtt_topic_prefix: default_topic_prefix(),
            mqtt_username: None,
            mqtt_password: None,
            history_size: default_event_history(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceServiceConfig {
    /// Address to bind the HTTP server to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Instance identifier used in logs and MQTT client ids
    #[serde(default = "default_node_id")]
    pub node_id: String,

    #[serde(default)]
    pub aws: AwsSettings,

    pub recognition: RecognitionSettings,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Polling period for sources with a snapshot URL
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    #[serde(default)]
    pub events: EventSettings,
}

impl FaceServiceConfig {
    /// Load from `FACE_SERVICE_CONFIG` (a JSON file) when set, otherwise from
    /// individual environment variables.
    pub fn from_env() -> Result<Self> {
        let config = match env::var("FACE_SERVICE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::from_lookup(|key| env::var(key).ok())?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Build from a key lookup, normally the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let collection_id =
            get("REKOGNITION_COLLECTION_ID").ok_or(ConfigError::Missing("REKOGNITION_COLLECTION_ID"))?;

        let similarity_threshold = match get("REKOGNITION_SIMILARITY_THRESHOLD") {
            Some(raw) => raw.trim().parse::<f64>().map_err(|e| {
                ConfigError::invalid("REKOGNITION_SIMILARITY_THRESHOLD", e)
            })?,
            None => DEFAULT_SIMILARITY_THRESHOLD,
        };

        let save = match get("SAVE_FILE_FOLDER") {
            Some(folder) => Some(SaveSettings {
                folder: PathBuf::from(folder),
                format: get("SAVE_FILE_FORMAT")
                    .map(|f| f.parse::<SaveFileFormat>())
                    .transpose()?
                    .unwrap_or_default(),
                save_timestamped_file: parse_flag(&get, "SAVE_TIMESTAMPED_FILE", false)?,
                always_save_latest_file: parse_flag(&get, "ALWAYS_SAVE_LATEST_FILE", false)?,
                show_boxes: parse_flag(&get, "SHOW_BOXES", true)?,
                label_font_path: get("LABEL_FONT_PATH").map(PathBuf::from),
            }),
            None => None,
        };

        let sources = match get("FACE_SOURCES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(SourceConfig::parse)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let scan_interval_secs = match get("SCAN_INTERVAL_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("SCAN_INTERVAL_SECS", e))?,
            None => DEFAULT_SCAN_INTERVAL_SECS,
        };

        let history_size = match get("EVENT_HISTORY_SIZE") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("EVENT_HISTORY_SIZE", e))?,
            None => DEFAULT_EVENT_HISTORY,
        };

        Ok(Self {
            bind_addr: get("FACE_SERVICE_ADDR").unwrap_or_else(default_bind_addr),
            node_id: get("NODE_ID").unwrap_or_else(default_node_id),
            aws: AwsSettings {
                region: get("AWS_REGION").unwrap_or_else(default_region),
                access_key_id: get("AWS_ACCESS_KEY_ID"),
                secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
                provider: get("FACE_SEARCH_PROVIDER")
                    .map(|p| p.parse::<SearchProvider>())
                    .transpose()?
                    .unwrap_or_default(),
            },
            recognition: RecognitionSettings {
                collection_id,
                similarity_threshold,
                max_faces: DEFAULT_MAX_FACES,
                save,
            },
            sources,
            scan_interval_secs,
            events: EventSettings {
                webhook_url: get("EVENT_WEBHOOK_URL"),
                webhook_token: get("EVENT_WEBHOOK_TOKEN"),
                mqtt_broker: get("EVENT_MQTT_BROKER"),
                mqtt_topic_prefix: get("EVENT_MQTT_TOPIC_PREFIX")
                    .unwrap_or_else(default_topic_prefix),
                mqtt_username: get("EVENT_MQTT_USERNAME"),
                mqtt_password: get("EVENT_MQTT_PASSWORD"),
                history_size,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_REGIONS.contains(&self.aws.region.as_str()) {
            return Err(ConfigError::invalid(
                "AWS_REGION",
                format!("'{}' is not a supported Rekognition region", self.aws.region),
            )
            .into());
        }

        if self.aws.access_key_id.is_some() != self.aws.secret_access_key.is_some() {
            return Err(ConfigError::invalid(
                "AWS_ACCESS_KEY_ID",
                "access key id and secret access key must be set together",
            )
            .into());
        }

        self.recognition.validate()?;

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.source_id()) {
                anyhow::bail!("duplicate source '{}'", source.source_id());
            }
        }

        validate_duration_secs(self.scan_interval_secs, "scan_interval_secs")?;

        if let Some(url) = &self.events.webhook_url {
            validate_uri(url, "webhook_url")?;
        }
        if let Some(broker) = &self.events.mqtt_broker {
            validate_uri(broker, "mqtt_broker")?;
        }

        Ok(())
    }
}

fn parse_flag<F>(get: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::invalid(
                key,
                format!("expected a boolean, got '{}'", other),
            )),
        },
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_node_id() -> String {
    format!(
        "face-service-{}",
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    )
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_max_faces() -> i32 {
    DEFAULT_MAX_FACES
}

fn default_true() -> bool {
    true
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_topic_prefix() -> String {
    DEFAULT_MQTT_TOPIC_PREFIX.to_string()
}

fn default_event_history() -> usize {
    DEFAULT_EVENT_HISTORY
}
