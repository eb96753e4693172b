//! # trek-settings
//!
//! Layered configuration for the Trek server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TrekSettings::default()`]
//! 2. **Settings file**: `~/.trek/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TREK_*` overrides (highest priority)
//!
//! Command-line flags in the `trek-agent` binary are applied on top.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = TrekSettings::default();
        let path = settings_path();
        assert!(path.ends_with(".trek/settings.json"));
    }
}
