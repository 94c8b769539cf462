use crate::error::{ThrottlerError, ThrottlerResult};
use envconfig::Envconfig;
use std::fmt;
use validator::Validate;

/// Credentials and seller identity shared by every client in a pool.
#[derive(Envconfig, Validate, Clone)]
pub struct PoolConfig {
    #[envconfig(from = "MWS_ACCESS_KEY")]
    #[validate(length(min = 1, message = "access key must not be empty"))]
    pub access_key: String,

    #[envconfig(from = "MWS_SECRET_KEY")]
    #[validate(length(min = 1, message = "secret key must not be empty"))]
    pub secret_key: String,

    #[envconfig(from = "MWS_APPLICATION_NAME")]
    #[validate(length(min = 1, message = "application name must not be empty"))]
    pub application_name: String,

    #[envconfig(from = "MWS_APPLICATION_VERSION", default = "1.0")]
    #[validate(length(min = 1, message = "application version must not be empty"))]
    pub application_version: String,

    #[envconfig(from = "MWS_MARKETPLACE_ID")]
    #[validate(length(min = 1, message = "marketplace id must not be empty"))]
    pub marketplace_id: String,

    #[envconfig(from = "MWS_SELLER_ID")]
    #[validate(length(min = 1, message = "seller id must not be empty"))]
    pub seller_id: String,

    /// Base URL every service endpoint suffix is appended to
    #[envconfig(from = "MWS_SERVICE_URL", default = "https://mws.amazonservices.com")]
    #[validate(url(message = "service url must be an absolute URL"))]
    pub service_url: String,

    /// Free-form id callers use to tag this pool's site
    #[envconfig(from = "MWS_CHANNEL_ID")]
    pub channel_id: Option<String>,
}

impl PoolConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ThrottlerResult<Self> {
        let config = Self::init_from_env()?;
        config.ensure_valid()?;
        Ok(config)
    }

    pub fn ensure_valid(&self) -> ThrottlerResult<()> {
        self.validate().map_err(ThrottlerError::from)
    }

    /// Full endpoint URL for a service path such as `/FulfillmentInboundShipment/2010-10-01`.
    pub fn service_endpoint(&self, suffix: &str) -> String {
        format!("{}{}", self.service_url.trim_end_matches('/'), suffix)
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("application_name", &self.application_name)
            .field("application_version", &self.application_version)
            .field("marketplace_id", &self.marketplace_id)
            .field("seller_id", &self.seller_id)
            .field("service_url", &self.service_url)
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> PoolConfig {
        PoolConfig {
            access_key: "AKIAEXAMPLE".to_string(),
            secret_key: "very-secret".to_string(),
            application_name: "action-throttler".to_string(),
            application_version: "1.0".to_string(),
            marketplace_id: "ATVPDKIKX0DER".to_string(),
            seller_id: "A1SELLER".to_string(),
            service_url: "https://mws.amazonservices.com/".to_string(),
            channel_id: Some("us-main".to_string()),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().ensure_valid().is_ok());
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let mut config = test_config();
        config.secret_key = String::new();
        assert!(matches!(
            config.ensure_valid(),
            Err(ThrottlerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_service_url_rejected() {
        let mut config = test_config();
        config.service_url = "not a url".to_string();
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn test_service_endpoint_joins_suffix() {
        let config = test_config();
        assert_eq!(
            config.service_endpoint("/FulfillmentInboundShipment/2010-10-01"),
            "https://mws.amazonservices.com/FulfillmentInboundShipment/2010-10-01"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
