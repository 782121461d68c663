use std::time::Duration;

const DEFAULT_ADDRESS_API_URL: &str = "http://localhost:3002/api/address";

/// Connection settings for the address validation service.
#[derive(Debug, Clone)]
pub struct AddressApiConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_retries: usize,
}

impl Default for AddressApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ADDRESS_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            max_retries: 2,
        }
    }
}

/// Timing of the address form's debouncers and banners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    pub state_debounce: Duration,
    pub zipcode_debounce: Duration,
    pub address_debounce: Duration,
    /// How long the "suggestion applied" banner stays up.
    pub selection_banner: Duration,
    /// Suggestions of an already valid address disappear after this long.
    pub suggestion_auto_hide: Duration,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            state_debounce: Duration::from_millis(300),
            zipcode_debounce: Duration::from_millis(500),
            address_debounce: Duration::from_millis(500),
            selection_banner: Duration::from_millis(3000),
            suggestion_auto_hide: Duration::from_millis(5000),
        }
    }
}
