//! Runtime settings of the relay.

/// Relay behaviour switches, built from the command line of `deai-server`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Also push `online_by_country` after every `online_count`
    pub presence_by_country: bool,
    /// Minimum `tasBalance` a search must declare to use advanced filters
    pub advanced_filter_min_balance: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            presence_by_country: false,
            advanced_filter_min_balance: 0.0,
        }
    }
}

impl RelayConfig {
    /// Whether a search qualifies for the advanced filter tier.
    pub fn grants_advanced(&self, requested: bool, balance: f64) -> bool {
        requested && balance >= self.advanced_filter_min_balance
    }
}
