//! Client for the external address validation service.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use db::models::address::Country;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;
use url::Url;

use super::config::AddressApiConfig;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AddressApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("json error: {0}")]
    Serde(String),
    /// The service answered with an error status but embedded its own verdict.
    #[error("validation rejected: {}", .0.error.as_deref().unwrap_or("invalid"))]
    Verdict(ZipcodeVerdict),
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}

impl AddressApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Answer of `POST /validate-zipcode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct ZipcodeVerdict {
    pub valid: bool,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ZipcodeRequest<'a> {
    zipcode: &'a str,
    country: Country,
    state: &'a str,
}

#[derive(Debug, Deserialize)]
struct StateSuggestionsResponse {
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Error body shape that carries a structured verdict instead of a transport failure.
#[derive(Debug, Deserialize)]
struct VerdictEnvelope {
    data: ZipcodeVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AddressComponents {
    pub house_number: Option<String>,
    pub street_name: Option<String>,
}

/// Canonical address proposed by the validation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct AddressSuggestion {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub country: String,
    #[serde(default)]
    pub components: Option<AddressComponents>,
}

impl AddressSuggestion {
    /// Street line to write into the form. Falls back to the structured components.
    pub fn street_line(&self) -> String {
        if !self.street.trim().is_empty() {
            return self.street.clone();
        }
        match &self.components {
            Some(AddressComponents {
                house_number,
                street_name,
            }) => [house_number.as_deref(), street_name.as_deref()]
                .into_iter()
                .flatten()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct AddressValidationRequest {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub country: Country,
}

/// Answer of `POST /validate-address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct AddressValidationResponse {
    pub valid: bool,
    #[serde(default)]
    pub suggestions: Vec<AddressSuggestion>,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait AddressApi: Send + Sync {
    async fn validate_zipcode(
        &self,
        zipcode: &str,
        country: Country,
        state: &str,
    ) -> Result<ZipcodeVerdict, AddressApiError>;

    async fn get_state_suggestions(&self, partial: &str) -> Result<Vec<String>, AddressApiError>;

    async fn validate_address(
        &self,
        request: &AddressValidationRequest,
    ) -> Result<AddressValidationResponse, AddressApiError>;
}

/// reqwest-backed [`AddressApi`].
#[derive(Debug, Clone)]
pub struct HttpAddressApi {
    http: Client,
    base_url: Url,
    max_retries: usize,
}

impl HttpAddressApi {
    pub fn new(config: &AddressApiConfig) -> Result<Self, AddressApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("address-book/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AddressApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&config.base_url)?,
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AddressApiError> {
        self.base_url
            .join(path)
            .map_err(|e| AddressApiError::InvalidBaseUrl(e.to_string()))
    }

    async fn execute<T, F>(&self, operation: &'static str, build: F) -> Result<T, AddressApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        (|| async { send_request::<T>(build()).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_delay(Duration::from_secs(2))
                    .with_max_times(self.max_retries)
                    .with_jitter(),
            )
            .when(|e: &AddressApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    operation,
                    "Address API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }
}

#[async_trait]
impl AddressApi for HttpAddressApi {
    async fn validate_zipcode(
        &self,
        zipcode: &str,
        country: Country,
        state: &str,
    ) -> Result<ZipcodeVerdict, AddressApiError> {
        let url = self.endpoint("validate-zipcode")?;
        let body = ZipcodeRequest {
            zipcode,
            country,
            state,
        };
        debug!(zipcode, state, "Validating zipcode");
        self.execute("validate_zipcode", || self.http.post(url.clone()).json(&body))
            .await
    }

    async fn get_state_suggestions(&self, partial: &str) -> Result<Vec<String>, AddressApiError> {
        let url = self.endpoint("state-suggestions")?;
        let response: StateSuggestionsResponse = self
            .execute("get_state_suggestions", || {
                self.http.get(url.clone()).query(&[("q", partial)])
            })
            .await?;
        Ok(response.suggestions)
    }

    async fn validate_address(
        &self,
        request: &AddressValidationRequest,
    ) -> Result<AddressValidationResponse, AddressApiError> {
        let url = self.endpoint("validate-address")?;
        self.execute("validate_address", || self.http.post(url.clone()).json(request))
            .await
    }
}

async fn send_request<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, AddressApiError> {
    let res = request.send().await.map_err(map_reqwest_error)?;

    match res.status() {
        s if s.is_success() => res
            .json::<T>()
            .await
            .map_err(|e| AddressApiError::Serde(e.to_string())),
        StatusCode::TOO_MANY_REQUESTS => Err(AddressApiError::RateLimited),
        s => {
            let body = res.text().await.unwrap_or_default();
            Err(classify_error_body(s.as_u16(), body))
        }
    }
}

/// An error body of the form `{ "data": { "valid": .., "error": .. } }` is the
/// service's own judgement, not a failure to reach it.
fn classify_error_body(status: u16, body: String) -> AddressApiError {
    match serde_json::from_str::<VerdictEnvelope>(&body) {
        Ok(envelope) => AddressApiError::Verdict(envelope.data),
        Err(_) => AddressApiError::Http { status, body },
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AddressApiError {
    if e.is_timeout() {
        AddressApiError::Timeout
    } else {
        AddressApiError::Transport(e.to_string())
    }
}

/// `Url::join` drops the last path segment unless the base ends with a slash.
fn normalize_base_url(raw: &str) -> Result<Url, AddressApiError> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| AddressApiError::InvalidBaseUrl(format!("{raw}: {e}")))
}
