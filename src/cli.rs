use clap::Parser;
use std::path::PathBuf;

use crate::config::{DatastoreKind, LlmProviderKind};

/// Self-healing API integration engine
#[derive(Parser, Debug, Clone)]
#[command(name = "stitch", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "STITCH_CONFIG", default_value = "stitch.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "STITCH_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "STITCH_PORT")]
    pub port: Option<u16>,

    /// Bearer token required on the API surface
    #[arg(long, env = "STITCH_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Datastore backend (memory, file, redis)
    #[arg(long, env = "STITCH_DATASTORE", value_enum)]
    pub datastore: Option<DatastoreKindArg>,

    /// Storage directory for the file backend
    #[arg(long, env = "STITCH_STORAGE_DIR")]
    pub storage_dir: Option<String>,

    /// Redis host
    #[arg(long, env = "STITCH_REDIS_HOST")]
    pub redis_host: Option<String>,

    /// Redis port
    #[arg(long, env = "STITCH_REDIS_PORT")]
    pub redis_port: Option<u16>,

    /// Redis username
    #[arg(long, env = "STITCH_REDIS_USERNAME")]
    pub redis_username: Option<String>,

    /// Redis password
    #[arg(long, env = "STITCH_REDIS_PASSWORD")]
    pub redis_password: Option<String>,

    /// LLM provider mode (primary, router)
    #[arg(long, env = "STITCH_PROVIDER", value_enum)]
    pub provider: Option<LlmProviderKindArg>,

    /// Default completion model
    #[arg(long, env = "STITCH_MODEL")]
    pub model: Option<String>,

    /// Model used for schema generation
    #[arg(long, env = "STITCH_SCHEMA_MODEL")]
    pub schema_model: Option<String>,
}

/// clap needs ValueEnum; keep the config enums serde-only
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum DatastoreKindArg {
    Memory,
    File,
    Redis,
}

impl From<DatastoreKindArg> for DatastoreKind {
    fn from(arg: DatastoreKindArg) -> Self {
        match arg {
            DatastoreKindArg::Memory => DatastoreKind::Memory,
            DatastoreKindArg::File => DatastoreKind::File,
            DatastoreKindArg::Redis => DatastoreKind::Redis,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LlmProviderKindArg {
    Primary,
    Router,
}

impl From<LlmProviderKindArg> for LlmProviderKind {
    fn from(arg: LlmProviderKindArg) -> Self {
        match arg {
            LlmProviderKindArg::Primary => LlmProviderKind::Primary,
            LlmProviderKindArg::Router => LlmProviderKind::Router,
        }
    }
}
