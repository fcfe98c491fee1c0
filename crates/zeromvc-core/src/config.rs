use std::time::Duration;

/// Configuration for a [`Context`](crate::Context).
///
/// All fields have sensible defaults (see [`Default`] impl).  Use struct
/// update syntax to override only the options you need:
///
/// ```
/// use std::time::Duration;
/// use zeromvc_core::Config;
///
/// let config = Config {
///     tick_interval: Duration::from_millis(33),
///     ..Config::default()
/// };
/// assert!(config.strict);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Interval between tick flushes (default: 16ms).
    pub tick_interval: Duration,
    /// Reject writes and non-getter calls made through views (default: true).
    ///
    /// When `false`, views get unrestricted access to models.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            strict: true,
        }
    }
}
