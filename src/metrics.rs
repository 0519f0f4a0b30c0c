//! Validation, key refresh and grant exchange metrics
//!
//! Provides Prometheus counters registered into a caller-owned registry.

use prometheus::{CounterVec, Opts, Registry};

const NAMESPACE: &str = "oauth2_resource";

/// Counters for the token validation engine and grant exchanges
#[derive(Clone)]
pub struct OAuth2Metrics {
    /// Validation outcomes, labelled `valid` or by error code
    pub validations: CounterVec,
    /// Key set refreshes, labelled `ok` or by error code
    pub key_refreshes: CounterVec,
    /// Grant exchanges by grant type and outcome
    pub exchanges: CounterVec,
}

impl OAuth2Metrics {
    /// Creates the counters and registers them
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let validations = CounterVec::new(
            Opts::new("token_validations_total", "Total bearer token validations")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(validations.clone()))?;

        let key_refreshes = CounterVec::new(
            Opts::new("key_refreshes_total", "Total key set refreshes").namespace(NAMESPACE),
            &["result"],
        )?;
        registry.register(Box::new(key_refreshes.clone()))?;

        let exchanges = CounterVec::new(
            Opts::new("grant_exchanges_total", "Total grant exchanges").namespace(NAMESPACE),
            &["grant_type", "outcome"],
        )?;
        registry.register(Box::new(exchanges.clone()))?;

        Ok(Self {
            validations,
            key_refreshes,
            exchanges,
        })
    }

    /// Records a validation outcome
    pub fn record_validation(&self, outcome: &str) {
        self.validations.with_label_values(&[outcome]).inc();
    }

    /// Records a key refresh result
    pub fn record_key_refresh(&self, result: &str) {
        self.key_refreshes.with_label_values(&[result]).inc();
    }

    /// Records a grant exchange outcome
    pub fn record_exchange(&self, grant_type: &str, outcome: &str) {
        self.exchanges
            .with_label_values(&[grant_type, outcome])
            .inc();
    }
}
