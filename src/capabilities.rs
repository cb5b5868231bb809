//! Runtime capability switches.
//!
//! Built-in tasks consult these before doing work. A task whose capability
//! is switched off completes with a skipped result rather than a failure.

use crate::config::CapabilitiesConfig;
use crate::error::AutonomyError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// A capability the operator can toggle at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Research topics through the reasoning service.
    Research,
    /// Consolidate learned facts.
    Learn,
    /// Send proactive messages to the notification sink.
    Message,
    /// Run monitoring probes.
    Monitor,
}

impl Capability {
    /// All capabilities in display order.
    pub const ALL: [Self; 4] = [Self::Research, Self::Learn, Self::Message, Self::Monitor];

    /// Stable name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Learn => "learn",
            Self::Message => "message",
            Self::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = AutonomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "research" | "web" => Ok(Self::Research),
            "learn" => Ok(Self::Learn),
            "message" => Ok(Self::Message),
            "monitor" | "screen" => Ok(Self::Monitor),
            other => Err(AutonomyError::Config(format!("unknown capability: {other}"))),
        }
    }
}

/// Lock-free capability flags shared by tasks and the decision loop.
#[derive(Debug)]
pub struct Capabilities {
    research: AtomicBool,
    learn: AtomicBool,
    message: AtomicBool,
    monitor: AtomicBool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::from_config(&CapabilitiesConfig::default())
    }
}

impl Capabilities {
    /// Initialise from the `[capabilities]` config section.
    pub fn from_config(config: &CapabilitiesConfig) -> Self {
        Self {
            research: AtomicBool::new(config.research),
            learn: AtomicBool::new(config.learn),
            message: AtomicBool::new(config.message),
            monitor: AtomicBool::new(config.monitor),
        }
    }

    fn flag(&self, capability: Capability) -> &AtomicBool {
        match capability {
            Capability::Research => &self.research,
            Capability::Learn => &self.learn,
            Capability::Message => &self.message,
            Capability::Monitor => &self.monitor,
        }
    }

    /// Whether `capability` is on.
    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.flag(capability).load(Ordering::Relaxed)
    }

    /// Switch `capability` on or off.
    pub fn set(&self, capability: Capability, enabled: bool) {
        self.flag(capability).store(enabled, Ordering::Relaxed);
    }

    /// Capabilities currently switched on.
    pub fn enabled(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parses_current_and_legacy_names() {
        assert_eq!("research".parse::<Capability>().unwrap(), Capability::Research);
        assert_eq!("web".parse::<Capability>().unwrap(), Capability::Research);
        assert_eq!("Screen".parse::<Capability>().unwrap(), Capability::Monitor);
        assert!("teleport".parse::<Capability>().is_err());
    }

    #[test]
    fn toggles_are_reflected_in_enabled_list() {
        let caps = Capabilities::default();
        assert_eq!(caps.enabled().len(), 4);

        caps.set(Capability::Message, false);
        assert!(!caps.is_enabled(Capability::Message));
        assert_eq!(
            caps.enabled(),
            vec![Capability::Research, Capability::Learn, Capability::Monitor]
        );
    }

    #[test]
    fn config_seeds_flags() {
        let caps = Capabilities::from_config(&CapabilitiesConfig {
            research: false,
            learn: true,
            message: false,
            monitor: true,
        });
        assert_eq!(caps.enabled(), vec![Capability::Learn, Capability::Monitor]);
    }
}
