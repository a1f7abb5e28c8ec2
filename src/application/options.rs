use std::time::Duration;

use super::paths::PathSettings;

pub const DEFAULT_EXTENSION: &str = ".hbs";
const DEFAULT_VIEWS_SLIDING: Duration = Duration::from_secs(5 * 60);

/// Engine settings that are not cache timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOptions {
    pub paths: PathSettings,
    /// Template file extension including the dot.
    pub extension: String,
    /// Sliding lifetime of compiled views. `None` recompiles on every lookup.
    pub views_sliding: Option<Duration>,
    /// Cache key namespace. `None` draws a random one per engine.
    pub key_prefix: Option<String>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            paths: PathSettings::default(),
            extension: DEFAULT_EXTENSION.to_string(),
            views_sliding: Some(DEFAULT_VIEWS_SLIDING),
            key_prefix: None,
        }
    }
}

impl From<&crate::config::ViewSettings> for ViewOptions {
    fn from(settings: &crate::config::ViewSettings) -> Self {
        Self {
            paths: PathSettings::from(settings),
            extension: settings.extension.clone(),
            views_sliding: settings.views_sliding,
            key_prefix: settings.cache_key_prefix.clone(),
        }
    }
}
