//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod database;
pub mod logging;
pub mod paging;

use serde::{Deserialize, Serialize};

pub use self::database::{DatabaseConfig, StoreDriver};
pub use self::logging::LoggingConfig;
pub use self::paging::PagingConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// configuration sources (base file + environment overlay + `BLOGDATA__*`
/// environment variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Search paging limits.
    #[serde(default)]
    pub paging: PagingConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from `path` (extension optional) merged with an
    /// optional `config/{env}` overlay and environment variables prefixed
    /// with `BLOGDATA__`, e.g. `BLOGDATA__DATABASE__URL`.
    pub fn load(path: &str, env: Option<&str>) -> Result<Self, AppError> {
        let mut builder =
            config::Config::builder().add_source(config::File::with_name(path).required(false));
        if let Some(env) = env {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{env}")).required(false));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("BLOGDATA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.paging.default_page_size == 0 {
            return Err(AppError::configuration("paging.default_page_size must be positive"));
        }
        if self.paging.default_page_size > self.paging.max_page_size {
            return Err(AppError::configuration(format!(
                "paging.default_page_size ({}) exceeds paging.max_page_size ({})",
                self.paging.default_page_size, self.paging.max_page_size
            )));
        }
        if self.database.driver == StoreDriver::Postgres && self.database.url.is_empty() {
            return Err(AppError::configuration(
                "database.url is required for the postgres driver",
            ));
        }
        Ok(())
    }
}
