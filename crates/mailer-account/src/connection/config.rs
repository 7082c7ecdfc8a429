//! Engine tuning.

use std::time::Duration;

/// Default delay before an idle connection sends a keepalive.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_secs(30);

/// Default size of one socket read.
pub const DEFAULT_READ_CHUNK: usize = 16 * 1024;

/// Runtime settings that are not part of the user-facing account
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Delay after the command queue drains before a keepalive is queued.
    pub idle_delay: Duration,
    /// Size of the buffer used for each socket read.
    pub read_chunk: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            idle_delay: DEFAULT_IDLE_DELAY,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

impl Settings {
    /// Creates a settings builder.
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }
}

/// Builder for [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Sets the idle delay.
    #[must_use]
    pub const fn idle_delay(mut self, delay: Duration) -> Self {
        self.settings.idle_delay = delay;
        self
    }

    /// Sets the read chunk size. Zero is raised to one byte.
    #[must_use]
    pub const fn read_chunk(mut self, size: usize) -> Self {
        self.settings.read_chunk = if size == 0 { 1 } else { size };
        self
    }

    /// Builds the settings.
    #[must_use]
    pub const fn build(self) -> Settings {
        self.settings
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.idle_delay, Duration::from_millis(30000));
        assert_eq!(settings.read_chunk, 16384);
    }

    #[test]
    fn test_builder() {
        let settings = Settings::builder()
            .idle_delay(Duration::from_secs(5))
            .read_chunk(0)
            .build();
        assert_eq!(settings.idle_delay, Duration::from_secs(5));
        assert_eq!(settings.read_chunk, 1);
    }
}
