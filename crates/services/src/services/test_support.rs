//! Scriptable in-memory [`AddressApi`] for tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use db::models::address::Country;

use super::address_api::{
    AddressApi, AddressApiError, AddressSuggestion, AddressValidationRequest,
    AddressValidationResponse, ZipcodeVerdict,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Zipcode { zipcode: String, state: String },
    StateSuggestions(String),
    Address(AddressValidationRequest),
}

#[derive(Default)]
pub struct MockAddressApi {
    zipcodes: Mutex<HashMap<(String, String), Result<ZipcodeVerdict, AddressApiError>>>,
    address_responses: Mutex<VecDeque<Result<AddressValidationResponse, AddressApiError>>>,
    address_delays: Mutex<VecDeque<Duration>>,
    zipcode_delay: Mutex<Option<Duration>>,
    state_suggestions: Mutex<Vec<String>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl MockAddressApi {
    pub fn with_zipcode(
        self,
        zipcode: &str,
        state: &str,
        result: Result<ZipcodeVerdict, AddressApiError>,
    ) -> Self {
        self.zipcodes
            .lock()
            .unwrap()
            .insert((zipcode.to_string(), state.to_string()), result);
        self
    }

    /// Responses are consumed in order; the last one repeats.
    pub fn with_address_response(
        self,
        result: Result<AddressValidationResponse, AddressApiError>,
    ) -> Self {
        self.address_responses.lock().unwrap().push_back(result);
        self
    }

    pub fn with_address_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.address_delays.lock().unwrap().extend(delays);
        self
    }

    pub fn with_zipcode_delay(self, delay: Duration) -> Self {
        *self.zipcode_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn with_state_suggestions(self, suggestions: &[&str]) -> Self {
        *self.state_suggestions.lock().unwrap() =
            suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn zipcode_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Zipcode { zipcode, state } => Some((zipcode, state)),
                _ => None,
            })
            .collect()
    }

    pub fn address_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ApiCall::Address(_)))
            .count()
    }
}

pub fn valid_zipcode(city: &str, state: &str) -> Result<ZipcodeVerdict, AddressApiError> {
    Ok(ZipcodeVerdict {
        valid: true,
        city: Some(city.to_string()),
        state: Some(state.to_string()),
        error: None,
    })
}

pub fn valid_address(
    suggestions: Vec<AddressSuggestion>,
) -> Result<AddressValidationResponse, AddressApiError> {
    Ok(AddressValidationResponse {
        valid: true,
        suggestions,
        error: None,
    })
}

pub fn invalid_address(
    suggestions: Vec<AddressSuggestion>,
    error: &str,
) -> Result<AddressValidationResponse, AddressApiError> {
    Ok(AddressValidationResponse {
        valid: false,
        suggestions,
        error: Some(error.to_string()),
    })
}

pub fn empire_state_suggestion() -> AddressSuggestion {
    AddressSuggestion {
        street: "350 5th Ave".to_string(),
        city: "New York".to_string(),
        state: "NY".to_string(),
        zipcode: "10118".to_string(),
        country: "United States".to_string(),
        components: None,
    }
}

#[async_trait]
impl AddressApi for MockAddressApi {
    async fn validate_zipcode(
        &self,
        zipcode: &str,
        _country: Country,
        state: &str,
    ) -> Result<ZipcodeVerdict, AddressApiError> {
        self.calls.lock().unwrap().push(ApiCall::Zipcode {
            zipcode: zipcode.to_string(),
            state: state.to_string(),
        });
        let scripted = self
            .zipcodes
            .lock()
            .unwrap()
            .get(&(zipcode.to_string(), state.to_string()))
            .cloned();
        let delay = *self.zipcode_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        scripted.unwrap_or_else(|| {
            Ok(ZipcodeVerdict {
                valid: false,
                city: None,
                state: None,
                error: Some(format!("Zipcode {zipcode} does not belong to {state}")),
            })
        })
    }

    async fn get_state_suggestions(&self, partial: &str) -> Result<Vec<String>, AddressApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::StateSuggestions(partial.to_string()));
        let partial = partial.to_lowercase();
        Ok(self
            .state_suggestions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.to_lowercase().starts_with(&partial))
            .cloned()
            .collect())
    }

    async fn validate_address(
        &self,
        request: &AddressValidationRequest,
    ) -> Result<AddressValidationResponse, AddressApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::Address(request.clone()));
        let delay = self.address_delays.lock().unwrap().pop_front();
        let response = {
            let mut responses = self.address_responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front()
            } else {
                responses.front().cloned()
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response.unwrap_or_else(|| valid_address(Vec::new()))
    }
}
