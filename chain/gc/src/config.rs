/// Account-state GC parameters. Immutable once the processor is constructed;
/// changing them requires a node restart.
#[derive(Debug, Clone)]
pub struct StateGcConfig {
    /// Whether background account-state GC is active
    pub enabled: bool,

    /// Key-block period between GC activations: a collection window only opens
    /// at heights divisible by this value
    pub interval: u64,

    /// Number of key blocks behind the top whose state roots must remain fully
    /// reachable after a swap
    pub history: u64,
}

impl Default for StateGcConfig {
    fn default() -> Self {
        Self { enabled: false, interval: 50_000, history: 500 }
    }
}

impl StateGcConfig {
    /// # Panics
    /// Panics if `interval` or `history` is zero.
    pub fn new(enabled: bool, interval: u64, history: u64) -> Self {
        assert!(interval >= 1, "state GC interval must be at least 1");
        assert!(history >= 1, "state GC history must be at least 1");
        Self { enabled, interval, history }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StateGcConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval, 50_000);
        assert_eq!(config.history, 500);
    }

    #[test]
    #[should_panic]
    fn test_zero_interval_rejected() {
        StateGcConfig::new(true, 0, 500);
    }

    #[test]
    #[should_panic]
    fn test_zero_history_rejected() {
        StateGcConfig::new(true, 10, 0);
    }
}
