//! Timeout budgets for the two long-polling paths.

use std::time::Duration;

/// Broker timeout configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long a polling proxy waits for a client offer before the broker
    /// answers 504 and forgets the proxy.
    pub proxy_timeout: Duration,
    /// How long a matched client waits for the proxy's answer before the
    /// broker answers 504 and retires the session.
    pub client_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            proxy_timeout: Duration::from_secs(30),
            client_timeout: Duration::from_secs(10),
        }
    }
}
