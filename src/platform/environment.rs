//! Host environment classification used to pick timeouts.

use std::time::Duration;

/// Broad class of host the SDK runs in.
///
/// Mobile hosts (Cordova shells, mobile browsers) get the longer variant of
/// every [`Delay`] because app switches and slow radios stretch round trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformEnvironment {
    #[default]
    Desktop,
    Mobile,
}

impl PlatformEnvironment {
    /// Reads `FIREBASE_FORCE_ENVIRONMENT` (`mobile`/`desktop`), defaulting to desktop.
    pub fn detect() -> Self {
        match std::env::var("FIREBASE_FORCE_ENVIRONMENT").ok().as_deref() {
            Some("mobile") | Some("cordova") => PlatformEnvironment::Mobile,
            _ => PlatformEnvironment::Desktop,
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, PlatformEnvironment::Mobile)
    }
}

/// A short/long pair of durations resolved against the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delay {
    pub short: Duration,
    pub long: Duration,
}

impl Delay {
    pub const fn new(short: Duration, long: Duration) -> Self {
        Self { short, long }
    }

    /// Uses the same duration on every platform.
    pub const fn fixed(duration: Duration) -> Self {
        Self::new(duration, duration)
    }

    pub fn get(&self, environment: PlatformEnvironment) -> Duration {
        if environment.is_mobile() {
            self.long
        } else {
            self.short
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_picks_long_variant_on_mobile() {
        let delay = Delay::new(Duration::from_secs(2), Duration::from_secs(10));
        assert_eq!(delay.get(PlatformEnvironment::Desktop), Duration::from_secs(2));
        assert_eq!(delay.get(PlatformEnvironment::Mobile), Duration::from_secs(10));
    }
}
