use clap::Parser;
use std::path::PathBuf;

/// Startup configuration. Every flag can also be set through its environment variable.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Tomato leaf disease detection server", long_about = None)]
pub struct Config {
    /// Path to the exported ONNX classifier
    #[arg(long, env = "LEAF_MODEL_PATH", default_value = "model/model.onnx")]
    pub model_path: PathBuf,

    /// Path to the JSON table mapping class indices to disease information
    #[arg(long, env = "LEAF_DISEASE_TABLE", default_value = "database/disease_info.json")]
    pub disease_table: PathBuf,

    #[arg(long, env = "LEAF_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "LEAF_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Number of HTTP workers; one keeps inference strictly one-at-a-time
    #[arg(
        long,
        env = "LEAF_WORKERS",
        default_value_t = 1,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub workers: usize,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "LEAF_MAX_UPLOAD_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}
