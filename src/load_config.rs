/// `load_config` module: reads the YAML settings file into an [`IngestConfig`].
///
/// This is the only place where user-supplied YAML settings are parsed. Missing sections
/// take the defaults of [`IngestConfig`]; `DV_INGEST_TEMP_DIR` in the environment
/// overrides the `temp_dir` key.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use dv_ingest_core::config::IngestConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const TEMP_DIR_ENV: &str = "DV_INGEST_TEMP_DIR";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<IngestConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: IngestConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Ok(temp_dir) = std::env::var(TEMP_DIR_ENV) {
        if !temp_dir.is_empty() {
            info!(temp_dir = %temp_dir, "Temp dir overridden from environment");
            config.temp_dir = Some(PathBuf::from(temp_dir));
        }
    }

    config.trace_loaded();
    Ok(config)
}
