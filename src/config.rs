//! Runtime configuration (SPEC_FULL §3 "Ambient addition — configuration").
//!
//! Grounded on the teacher's `render-gl::backend::OpenGlInstance::with_gl`,
//! which takes a `config::Config` at backend creation time. Nothing here is
//! part of the host ABI; it's diagnostics/testing knobs the embedding
//! application can tune without recompiling, defaulting to built-in values
//! so the device works with zero configuration.

use config::{Config, Environment, File};
use serde::Deserialize;

/// Environment variable prefix for overrides, e.g. `GS_METAL_LOG_LEVEL=debug`.
const ENV_PREFIX: &str = "GS_METAL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GsConfig {
    /// Transient pool allocation granularity in bytes (spec §4.2: "rounded
    /// up to 16 bytes").
    pub transient_pool_granularity: usize,
    /// When a shader fails to transpile, dump the partially-rewritten MSL
    /// source to a temp file before returning the error, to ease debugging
    /// a host-provided shader program.
    pub dump_failed_shaders: bool,
    /// Log level filter used when the host process has not otherwise
    /// initialized a logger (see [`crate::log::init_default`]).
    pub log_level: String,
}

impl Default for GsConfig {
    fn default() -> Self {
        GsConfig {
            transient_pool_granularity: 16,
            dump_failed_shaders: false,
            log_level: "warn".to_string(),
        }
    }
}

impl GsConfig {
    /// Loads configuration from (in ascending precedence) built-in defaults,
    /// an optional `gs_metal.toml` in the working directory, and
    /// `GS_METAL_*` environment variables.
    pub fn load() -> Self {
        Self::try_load().unwrap_or_else(|err| {
            log::warn!("falling back to default configuration: {err}");
            GsConfig::default()
        })
    }

    fn try_load() -> Result<Self, config::ConfigError> {
        let defaults = GsConfig::default();
        let config = Config::builder()
            .set_default("transient_pool_granularity", defaults.transient_pool_granularity as i64)?
            .set_default("dump_failed_shaders", defaults.dump_failed_shaders)?
            .set_default("log_level", defaults.log_level)?
            .add_source(File::with_name("gs_metal").required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_granularity() {
        let cfg = GsConfig::default();
        assert_eq!(cfg.transient_pool_granularity, 16);
        assert!(!cfg.dump_failed_shaders);
    }
}
