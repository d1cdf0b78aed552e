use std::path::PathBuf;

use clap::Parser;

use crate::access_log::DEFAULT_LOG_CAPACITY;
use crate::cache::DEFAULT_CACHE_LIMIT;
use crate::fs::{FileManagerConfig, DEFAULT_COPY_SUFFIX};

#[derive(Parser, Debug)]
#[command(
    name = "simse-vfm-engine",
    about = "Virtual file manager engine over JSON-RPC 2.0 / NDJSON stdio"
)]
pub struct CliArgs {
    /// Directory holding filesystem.json, users.json, system_log.json and file_index.json
    #[arg(long, default_value = "data", env = "SIMSE_VFM_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Content cache limit in bytes
    #[arg(long, default_value_t = DEFAULT_CACHE_LIMIT, env = "SIMSE_VFM_CACHE_LIMIT")]
    pub cache_limit: u64,

    /// Number of access log entries kept in memory
    #[arg(long, default_value_t = DEFAULT_LOG_CAPACITY)]
    pub log_capacity: usize,

    /// Word used when auto-renaming duplicates ("name - copy.txt")
    #[arg(long, default_value = DEFAULT_COPY_SUFFIX, env = "SIMSE_VFM_COPY_SUFFIX")]
    pub copy_suffix: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", env = "SIMSE_VFM_LOG_LEVEL")]
    pub log_level: String,
}

impl CliArgs {
    pub fn to_manager_config(&self) -> FileManagerConfig {
        FileManagerConfig {
            data_dir: self.data_dir.clone(),
            cache_limit: self.cache_limit,
            log_capacity: self.log_capacity,
            copy_suffix: self.copy_suffix.clone(),
        }
    }
}
