//! Cross-validation of a zipcode against the selected state.

use std::sync::Arc;

use db::models::address::Country;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ts_rs::TS;

use super::address_api::{AddressApi, AddressApiError, ZipcodeVerdict};

pub const ZIPCODE_LOOKUP_FAILED: &str = "Error validating zipcode. Please try again.";
const ZIPCODE_INVALID: &str = "Invalid zipcode";

/// Last known verdict for the form's zipcode. `is_valid == None` means "not confirmed".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct ZipcodeValidation {
    pub is_valid: Option<bool>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl ZipcodeValidation {
    pub fn is_confirmed_invalid(&self) -> bool {
        self.is_valid == Some(false)
    }

    fn lookup_failed() -> Self {
        Self {
            is_valid: None,
            city: None,
            state: None,
            error: Some(ZIPCODE_LOOKUP_FAILED.to_string()),
        }
    }
}

impl From<ZipcodeVerdict> for ZipcodeValidation {
    fn from(verdict: ZipcodeVerdict) -> Self {
        if verdict.valid {
            Self {
                is_valid: Some(true),
                city: verdict.city.filter(|c| !c.trim().is_empty()),
                state: verdict.state,
                error: None,
            }
        } else {
            Self {
                is_valid: Some(false),
                city: None,
                state: None,
                error: Some(verdict.error.unwrap_or_else(|| ZIPCODE_INVALID.to_string())),
            }
        }
    }
}

/// Turns zipcode lookups into [`ZipcodeValidation`] values. Never fails.
#[derive(Clone)]
pub struct ZipcodeValidator {
    api: Arc<dyn AddressApi>,
}

impl ZipcodeValidator {
    pub fn new(api: Arc<dyn AddressApi>) -> Self {
        Self { api }
    }

    pub async fn validate(
        &self,
        zipcode: &str,
        country: Country,
        state: &str,
    ) -> ZipcodeValidation {
        match self.api.validate_zipcode(zipcode, country, state).await {
            Ok(verdict) => {
                debug!(zipcode, state, valid = verdict.valid, "Zipcode verdict");
                verdict.into()
            }
            Err(AddressApiError::Verdict(verdict)) => {
                debug!(
                    zipcode,
                    state,
                    valid = verdict.valid,
                    "Zipcode verdict carried in error response"
                );
                verdict.into()
            }
            Err(e) => {
                warn!(zipcode, state, error = %e, "Zipcode validation failed");
                ZipcodeValidation::lookup_failed()
            }
        }
    }
}
