use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// One harvested record plus its provenance.
///
/// Produced by an [`InputBroker`](crate::traits::InputBroker) and handed by
/// reference to every [`OutputBroker`](crate::traits::OutputBroker) of the job.
/// Fields are private: once the producing broker returns it, a reference is
/// never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataReference {
    id: String,
    source_uri: String,
    broker_uri: String,
    fetch_timestamp: DateTime<Utc>,
    content: Vec<u8>,
    content_type: ContentType,
    attributes: BTreeMap<String, String>,
}

impl DataReference {
    /// Creates a reference stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        source_uri: impl Into<String>,
        broker_uri: impl Into<String>,
        content: Vec<u8>,
        content_type: ContentType,
    ) -> Self {
        Self {
            id: id.into(),
            source_uri: source_uri.into(),
            broker_uri: broker_uri.into(),
            fetch_timestamp: Utc::now(),
            content,
            content_type,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_fetch_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.fetch_timestamp = timestamp;
        self
    }

    /// Merges extracted properties; existing keys are overwritten.
    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Record identifier within its source (e.g. relative path, catalog record id).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    /// URI of the broker that produced this record.
    pub fn broker_uri(&self) -> &str {
        &self.broker_uri
    }

    pub fn fetch_timestamp(&self) -> DateTime<Utc> {
        self.fetch_timestamp
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

impl fmt::Display for DataReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.source_uri)
    }
}

/// Media type of a record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Xml,
    Json,
    Pdf,
    Text,
    Binary,
    /// Any other MIME type, kept verbatim.
    Other(String),
}

impl ContentType {
    /// Guesses the content type from a file extension (case-insensitive).
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "xml" => ContentType::Xml,
            "json" | "geojson" => ContentType::Json,
            "pdf" => ContentType::Pdf,
            "txt" | "text" => ContentType::Text,
            _ => ContentType::Binary,
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            ContentType::Xml => "application/xml",
            ContentType::Json => "application/json",
            ContentType::Pdf => "application/pdf",
            ContentType::Text => "text/plain",
            ContentType::Binary => "application/octet-stream",
            ContentType::Other(mime) => mime,
        }
    }
}

/// Direction of a registered broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    /// Source of records
    Inbound,
    /// Destination of records
    Outbound,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Inbound => f.write_str("INBOUND"),
            Category::Outbound => f.write_str("OUTBOUND"),
        }
    }
}

/// Raw, not yet validated configuration for one connector kind.
///
/// Only [`ConnectorTemplate::validate`](crate::harvest::ConnectorTemplate::validate)
/// turns this into a [`BrokerDefinition`](crate::harvest::BrokerDefinition).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Connector kind, e.g. `"FOLDER"`
    #[serde(rename = "type")]
    pub type_key: String,

    /// Optional human label
    #[serde(default)]
    pub label: Option<String>,

    /// Named configuration values
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Crawl politeness, passed to network-reachable brokers unmodified
    #[serde(default)]
    pub politeness: Option<PolitenessConfig>,
}

impl EntityDefinition {
    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_politeness(mut self, politeness: PolitenessConfig) -> Self {
        self.politeness = Some(politeness);
        self
    }
}

/// Crawl rate / robots-exclusion settings.
///
/// Opaque to the engine: it is carried from the definition to the broker
/// constructor and interpreted only by network connectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolitenessConfig {
    pub mode: BotsMode,
    pub user_agent: String,
    /// Minimum delay between two requests to the same host
    pub request_interval_ms: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            mode: BotsMode::Inherit,
            user_agent: format!("metadata-harvester/{}", env!("CARGO_PKG_VERSION")),
            request_interval_ms: 0,
        }
    }
}

/// How robots.txt is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotsMode {
    /// Use the process-wide default
    Inherit,
    Always,
    Never,
}

/// A registered broker: identity, direction and raw definition.
///
/// Read-only once created; the engine replaces or removes entries, it never
/// mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerInfo {
    id: Uuid,
    category: Category,
    definition: EntityDefinition,
}

impl BrokerInfo {
    pub fn new(id: Uuid, category: Category, definition: EntityDefinition) -> Self {
        Self {
            id,
            category,
            definition,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn definition(&self) -> &EntityDefinition {
        &self.definition
    }
}

/// Identity of one submitted harvest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
