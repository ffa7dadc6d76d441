//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Live source database. When absent the source catalog is read from the
    /// snapshot documents under `output.path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ConnectionConfig>,

    /// Target database; always read live, never modified.
    pub target: ConnectionConfig,

    /// Where scripts and snapshot documents are written.
    #[serde(default)]
    pub output: OutputConfig,

    /// Schemas and tables mirrored structurally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<MirrorPolicy>,

    /// Schemas and tables whose rows are mirrored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MirrorPolicy>,

    /// When routine definitions are replaced in the alter script.
    #[serde(default)]
    pub routines: RoutinePolicy,
}

impl Config {
    /// True when the source catalog comes from a snapshot rather than a live
    /// connection.
    pub fn is_offline(&self) -> bool {
        self.source.is_none() && self.output.path.is_some()
    }

    /// Directory that receives the generated artifacts.
    pub fn output_dir(&self) -> PathBuf {
        self.output
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// SQL Server connection descriptor.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Encrypt connection (default: false).
    #[serde(default)]
    pub encrypt: bool,

    /// Trust server certificate (default: true).
    #[serde(default = "default_true")]
    pub trust_server_cert: bool,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Output and snapshot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Script directory; doubles as the snapshot directory in offline mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Also write `model.json` and `data.json` for later offline runs.
    #[serde(default)]
    pub dump: bool,
}

/// Include/exclude policy for one mirroring concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorPolicy {
    /// Schema-level selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas: Option<ObjectFilter>,

    /// Table-level overrides by qualified name (`schema.table`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<ObjectFilter>,
}

/// An include list, an exclude list, or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

/// Routine replacement policy for the alter script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutinePolicy {
    /// Replace every function, view and procedure on each run.
    #[default]
    Always,

    /// Replace only routines the source modified after the target did.
    WhenNewer,
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}
