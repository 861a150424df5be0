//! Paging limits for searches.

use serde::{Deserialize, Serialize};

/// Page size defaults and limits applied to caller-supplied table filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Page size used when a request does not name one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Largest page size a request may ask for.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    10
}

fn default_max_page_size() -> u32 {
    100
}
