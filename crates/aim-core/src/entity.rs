//! # Entity Records
//!
//! The five record kinds held by the configuration store, as statically
//! typed structs. Field names match the storage column names exactly, so a
//! record serializes back to the same shape a loader read it from.
//!
//! ## Defaults
//!
//! The storage layer fills in column defaults when a value is absent. The
//! same defaults are applied here during deserialization (for both a
//! missing key and an explicit `null`), so a record written by an
//! implementation that stores the default explicitly compares equal to one
//! written by an implementation that relies on the column default.
//!
//! | Column | Default |
//! |---|---|
//! | `timeout` | `30000` (milliseconds) |
//! | provider `type` | `public_welfare` |
//! | `mcp_servers.type` | `stdio` |
//! | `common_configs.category` | `general` |
//! | `enabled` | `0` |
//! | `is_active` | `1` |

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: i64 = 30_000;
/// Default provider type.
pub const DEFAULT_PROVIDER_TYPE: &str = "public_welfare";
/// Default MCP transport.
pub const DEFAULT_MCP_TYPE: &str = "stdio";
/// Default configuration category.
pub const DEFAULT_CATEGORY: &str = "general";

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// The five entity kinds, addressed by their storage table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// `claude_providers`
    #[serde(rename = "claude_providers")]
    ClaudeProvider,
    /// `codex_providers`
    #[serde(rename = "codex_providers")]
    CodexProvider,
    /// `agent_guides`
    #[serde(rename = "agent_guides")]
    AgentGuide,
    /// `mcp_servers`
    #[serde(rename = "mcp_servers")]
    McpServer,
    /// `common_configs`
    #[serde(rename = "common_configs")]
    CommonConfig,
}

impl EntityKind {
    /// Every kind, in report order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::ClaudeProvider,
        EntityKind::CodexProvider,
        EntityKind::AgentGuide,
        EntityKind::McpServer,
        EntityKind::CommonConfig,
    ];

    /// The storage table name.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::ClaudeProvider => "claude_providers",
            Self::CodexProvider => "codex_providers",
            Self::AgentGuide => "agent_guides",
            Self::McpServer => "mcp_servers",
            Self::CommonConfig => "common_configs",
        }
    }

    /// Resolve a storage table name.
    pub fn from_table_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|k| k.table_name() == name)
            .ok_or_else(|| CoreError::UnknownTable(name.to_string()))
    }

    /// The field that identifies a record across implementations.
    pub fn natural_key_field(self) -> &'static str {
        match self {
            Self::CommonConfig => "key",
            _ => "name",
        }
    }

    /// Fields holding encrypted tokens.
    pub fn secret_fields(self) -> &'static [&'static str] {
        match self {
            Self::ClaudeProvider | Self::CodexProvider => &["token"],
            _ => &[],
        }
    }

    /// Whether at most one record of this kind may be enabled at a time.
    pub fn is_singleton_enabled(self) -> bool {
        matches!(self, Self::ClaudeProvider | Self::CodexProvider)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

// ---------------------------------------------------------------------------
// Flag
// ---------------------------------------------------------------------------

/// A boolean-domain column value.
///
/// Stored as the raw integer so that values outside `{0, 1}` survive
/// loading and can be reported. JSON `true`/`false` deserialize as `1`/`0`;
/// serialization always produces the integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Flag(pub i64);

impl Flag {
    pub const OFF: Flag = Flag(0);
    pub const ON: Flag = Flag(1);

    /// True when the value is exactly 0 or 1.
    pub fn is_canonical(self) -> bool {
        self.0 == 0 || self.0 == 1
    }

    /// Truthiness as the storage engine sees it: any non-zero value.
    pub fn is_on(self) -> bool {
        self.0 != 0
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<bool> for Flag {
    fn from(b: bool) -> Self {
        Flag(i64::from(b))
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FlagVisitor;

        impl<'de> Visitor<'de> for FlagVisitor {
            type Value = Flag;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or a boolean")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Flag, E> {
                Ok(Flag::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Flag, E> {
                Ok(Flag(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Flag, E> {
                i64::try_from(v)
                    .map(Flag)
                    .map_err(|_| E::custom(format!("flag value {v} out of range")))
            }
        }

        deserializer.deserialize_any(FlagVisitor)
    }
}

// ---------------------------------------------------------------------------
// Entity trait
// ---------------------------------------------------------------------------

/// Common surface over the five record types.
pub trait Entity: Serialize + DeserializeOwned + Clone + fmt::Debug {
    /// Which collection this record belongs to.
    const KIND: EntityKind;

    /// Surrogate id. Implementation-assigned; not stable across a migration.
    fn id(&self) -> Option<i64>;

    /// The value that pairs this record with its counterpart on the other side.
    fn natural_key(&self) -> &str;

    /// The ciphertext held in a secret field, if `field` is one.
    fn secret(&self, _field: &str) -> Option<&str> {
        None
    }

    /// All `(field, ciphertext)` pairs of this record.
    fn secrets(&self) -> Vec<(&'static str, &str)> {
        Self::KIND
            .secret_fields()
            .iter()
            .filter_map(|field| self.secret(field).map(|v| (*field, v)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A Claude API provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeProvider {
    /// Absent in exports that never carried surrogate ids.
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    /// Fernet token.
    pub token: String,
    #[serde(default = "default_timeout", deserialize_with = "timeout_or_default")]
    pub timeout: i64,
    /// 1 disables client telemetry. Absent on older stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<Flag>,
    #[serde(
        rename = "type",
        default = "default_provider_type",
        deserialize_with = "provider_type_or_default"
    )]
    pub provider_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enabled: Flag,
    #[serde(default)]
    pub opus_model: Option<String>,
    #[serde(default)]
    pub sonnet_model: Option<String>,
    #[serde(default)]
    pub haiku_model: Option<String>,
    /// Legacy model-parameter columns, present only in older stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Entity for ClaudeProvider {
    const KIND: EntityKind = EntityKind::ClaudeProvider;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }

    fn secret(&self, field: &str) -> Option<&str> {
        (field == "token").then_some(self.token.as_str())
    }
}

/// A Codex API provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodexProvider {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    /// Fernet token.
    pub token: String,
    #[serde(
        rename = "type",
        default = "default_provider_type",
        deserialize_with = "provider_type_or_default"
    )]
    pub provider_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enabled: Flag,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Entity for CodexProvider {
    const KIND: EntityKind = EntityKind::CodexProvider;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }

    fn secret(&self, field: &str) -> Option<&str> {
        (field == "token").then_some(self.token.as_str())
    }
}

/// A named agent guide document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentGuide {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    /// `only` or `and`.
    #[serde(rename = "type")]
    pub guide_type: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Entity for AgentGuide {
    const KIND: EntityKind = EntityKind::AgentGuide;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

/// An MCP server launch definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(
        rename = "type",
        default = "default_mcp_type",
        deserialize_with = "mcp_type_or_default"
    )]
    pub server_type: String,
    #[serde(default = "default_timeout", deserialize_with = "timeout_or_default")]
    pub timeout: i64,
    pub command: String,
    /// Order is significant.
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Flag>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Entity for McpServer {
    const KIND: EntityKind = EntityKind::McpServer;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

/// A generic key/value setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonConfig {
    #[serde(default)]
    pub id: Option<i64>,
    pub key: String,
    /// May reference environment variables such as `${HOME}`; compared verbatim.
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_category", deserialize_with = "category_or_default")]
    pub category: String,
    #[serde(default = "default_active", deserialize_with = "active_or_default")]
    pub is_active: Flag,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Entity for CommonConfig {
    const KIND: EntityKind = EntityKind::CommonConfig;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.key
    }
}

// ---------------------------------------------------------------------------
// Column defaults
// ---------------------------------------------------------------------------

fn default_timeout() -> i64 {
    DEFAULT_TIMEOUT_MS
}

fn default_provider_type() -> String {
    DEFAULT_PROVIDER_TYPE.to_string()
}

fn default_mcp_type() -> String {
    DEFAULT_MCP_TYPE.to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_active() -> Flag {
    Flag::ON
}

fn timeout_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(d)?.unwrap_or(DEFAULT_TIMEOUT_MS))
}

fn provider_type_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_provider_type))
}

fn mcp_type_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_mcp_type))
}

fn category_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_category))
}

fn active_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<Flag, D::Error> {
    Ok(Option::<Flag>::deserialize(d)?.unwrap_or(Flag::ON))
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}
