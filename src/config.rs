//! Container options, with environment overrides for deployments.

use std::env;
#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`ContainerOptions::max_resolution_depth`].
pub const ENV_MAX_RESOLUTION_DEPTH: &str = "TIERED_DI_MAX_RESOLUTION_DEPTH";
/// Environment variable overriding [`ContainerOptions::warn_on_undisposed_drop`].
pub const ENV_WARN_ON_UNDISPOSED_DROP: &str = "TIERED_DI_WARN_ON_UNDISPOSED_DROP";
/// Environment variable overriding [`ContainerOptions::trace_resolutions`].
pub const ENV_TRACE_RESOLUTIONS: &str = "TIERED_DI_TRACE_RESOLUTIONS";

/// Runtime options for a [`ServiceProvider`](crate::ServiceProvider)
///
/// # Examples
///
/// ```rust
/// use tiered_di::{ContainerOptions, ServiceProvider};
///
/// let options = ContainerOptions {
///     max_resolution_depth: 64,
///     ..ContainerOptions::default()
/// };
/// let provider = ServiceProvider::builder().options(options).build();
/// assert_eq!(provider.options().max_resolution_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerOptions {
    /// Deepest chain of nested resolutions on one thread before failing
    pub max_resolution_depth: usize,
    /// Warn when a scope or provider holding teardown-bearing instances is
    /// dropped without being disposed
    pub warn_on_undisposed_drop: bool,
    /// Emit a `trace` event for every resolution
    pub trace_resolutions: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            max_resolution_depth: 1024,
            warn_on_undisposed_drop: true,
            trace_resolutions: false,
        }
    }
}

impl ContainerOptions {
    /// Defaults overlaid with the `TIERED_DI_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`. Malformed values are
    /// ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(raw) = lookup(ENV_MAX_RESOLUTION_DEPTH) {
            match raw.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => options.max_resolution_depth = depth,
                _ => tracing::warn!(variable = ENV_MAX_RESOLUTION_DEPTH, value = %raw, "ignoring malformed option"),
            }
        }
        if let Some(raw) = lookup(ENV_WARN_ON_UNDISPOSED_DROP) {
            match parse_bool(&raw) {
                Some(flag) => options.warn_on_undisposed_drop = flag,
                None => tracing::warn!(variable = ENV_WARN_ON_UNDISPOSED_DROP, value = %raw, "ignoring malformed option"),
            }
        }
        if let Some(raw) = lookup(ENV_TRACE_RESOLUTIONS) {
            match parse_bool(&raw) {
                Some(flag) => options.trace_resolutions = flag,
                None => tracing::warn!(variable = ENV_TRACE_RESOLUTIONS, value = %raw, "ignoring malformed option"),
            }
        }

        options
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
