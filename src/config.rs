//! Frozen runtime configuration, assembled through a fallible builder the
//! same way `crab-client`'s `RemoteClientBuilder`/`LocalClientBuilder` build
//! their respective client configs.

use std::time::Duration;

use crate::error::IapError;

/// Receipt validation strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Local,
    Remote,
    LocalThenRemote,
}

#[derive(Debug, Clone)]
pub struct ReceiptValidationConfig {
    pub mode: ValidationMode,
    pub server_url: Option<String>,
    pub shared_secret: Option<String>,
    pub validate_bundle_id: bool,
    pub validate_app_version: bool,
    pub cache_expiration: Duration,
    /// Required for order-bound local validation; `None` disables the check.
    pub bundle_id: Option<String>,
    pub app_version: Option<String>,
}

impl Default for ReceiptValidationConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Local,
            server_url: None,
            shared_secret: None,
            validate_bundle_id: false,
            validate_app_version: false,
            cache_expiration: Duration::from_secs(300),
            bundle_id: None,
            app_version: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// Frozen configuration record driving every component's behavior. There is
/// no environment-variable or file-based configuration in the core — all
/// behavior flows from this struct.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub auto_finish_transactions: bool,
    pub auto_recover_transactions: bool,
    pub max_retry_attempts: u32,
    pub base_retry_delay: Duration,
    pub product_cache_expiration: Duration,
    pub receipt_validation: ReceiptValidationConfig,
    pub network: NetworkConfig,
}

impl Configuration {
    /// `initialize(config)` is idempotent with a semantically equal config;
    /// this is the equality the `IapManager` checks re-init against.
    pub fn is_equivalent(&self, other: &Configuration) -> bool {
        self.auto_finish_transactions == other.auto_finish_transactions
            && self.auto_recover_transactions == other.auto_recover_transactions
            && self.max_retry_attempts == other.max_retry_attempts
            && self.base_retry_delay == other.base_retry_delay
            && self.product_cache_expiration == other.product_cache_expiration
            && self.network.base_url == other.network.base_url
            && self.network.timeout == other.network.timeout
            && self.receipt_validation.mode == other.receipt_validation.mode
            && self.receipt_validation.server_url == other.receipt_validation.server_url
    }
}

/// Builder for [`Configuration`]. Mirrors the teacher's client builders:
/// plain setter methods, a fallible `build()` that validates cross-field
/// requirements before returning.
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    auto_finish_transactions: bool,
    auto_recover_transactions: bool,
    max_retry_attempts: u32,
    base_retry_delay: Duration,
    product_cache_expiration: Duration,
    receipt_validation: ReceiptValidationConfig,
    base_url: Option<String>,
    network_timeout: Duration,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self {
            auto_finish_transactions: true,
            auto_recover_transactions: true,
            max_retry_attempts: 3,
            base_retry_delay: Duration::from_secs(1),
            product_cache_expiration: Duration::from_secs(3600),
            receipt_validation: ReceiptValidationConfig::default(),
            base_url: None,
            network_timeout: Duration::from_secs(30),
        }
    }
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_finish_transactions(mut self, value: bool) -> Self {
        self.auto_finish_transactions = value;
        self
    }

    pub fn auto_recover_transactions(mut self, value: bool) -> Self {
        self.auto_recover_transactions = value;
        self
    }

    pub fn max_retry_attempts(mut self, value: u32) -> Self {
        self.max_retry_attempts = value;
        self
    }

    pub fn base_retry_delay(mut self, value: Duration) -> Self {
        self.base_retry_delay = value;
        self
    }

    pub fn product_cache_expiration(mut self, value: Duration) -> Self {
        self.product_cache_expiration = value;
        self
    }

    pub fn receipt_validation(mut self, value: ReceiptValidationConfig) -> Self {
        self.receipt_validation = value;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn network_timeout(mut self, value: Duration) -> Self {
        self.network_timeout = value;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    /// Returns [`IapError::ConfigurationError`] if `base_url` is missing, or
    /// if the receipt validation mode requires `server_url` and none was set.
    pub fn build(self) -> Result<Configuration, IapError> {
        let base_url = self
            .base_url
            .ok_or_else(|| IapError::ConfigurationError("network.base_url is required".into()))?;

        if matches!(
            self.receipt_validation.mode,
            ValidationMode::Remote | ValidationMode::LocalThenRemote
        ) && self.receipt_validation.server_url.is_none()
        {
            return Err(IapError::ConfigurationError(
                "receipt_validation.server_url is required for remote/local_then_remote modes"
                    .into(),
            ));
        }

        Ok(Configuration {
            auto_finish_transactions: self.auto_finish_transactions,
            auto_recover_transactions: self.auto_recover_transactions,
            max_retry_attempts: self.max_retry_attempts,
            base_retry_delay: self.base_retry_delay,
            product_cache_expiration: self.product_cache_expiration,
            receipt_validation: self.receipt_validation,
            network: NetworkConfig {
                base_url,
                timeout: self.network_timeout,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_base_url() {
        let err = ConfigurationBuilder::new().build().unwrap_err();
        assert!(matches!(err, IapError::ConfigurationError(_)));
    }

    #[test]
    fn build_requires_server_url_for_remote_mode() {
        let err = ConfigurationBuilder::new()
            .base_url("https://example.com")
            .receipt_validation(ReceiptValidationConfig {
                mode: ValidationMode::Remote,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, IapError::ConfigurationError(_)));
    }

    #[test]
    fn build_succeeds_for_local_mode_without_server_url() {
        let config = ConfigurationBuilder::new()
            .base_url("https://example.com")
            .build()
            .unwrap();
        assert_eq!(config.network.base_url, "https://example.com");
    }

    #[test]
    fn is_equivalent_ignores_unrelated_fields() {
        let a = ConfigurationBuilder::new().base_url("https://a.test").build().unwrap();
        let b = ConfigurationBuilder::new().base_url("https://a.test").build().unwrap();
        assert!(a.is_equivalent(&b));
    }
}
