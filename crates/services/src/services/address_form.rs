//! Address form session: owns the draft, wires edits to debounced lookups and
//! decides whether the address can be submitted.

use std::sync::Arc;

use db::models::address::{Address, AddressType, Country, CreateAddress, UpdateAddress};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ts_rs::TS;
use utils::event_bus::{EventBus, Toast};
use uuid::Uuid;

use super::{
    address_api::{AddressApi, AddressValidationRequest},
    address_book::MAX_ADDRESSES_PER_ACCOUNT,
    address_draft::{AddressDraft, AddressField, PincodeIssue, address_type_available},
    config::ValidationConfig,
    debounce::{Debouncer, FieldPolicy},
    street_heuristic::StreetAddressIssue,
    suggestion_reconciler::{LocationField, SuggestionReconciler, ValidationState, ZipcodeApplied},
    zipcode_validator::{ZipcodeValidation, ZipcodeValidator},
};

const VALIDATION_IN_PROGRESS: &str = "Address validation is still in progress.";
const ADDRESS_UNVERIFIED: &str = "Please verify the address before saving.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    New,
    Edit {
        address_id: Uuid,
        original_type: AddressType,
    },
}

/// What the form knows about the account it is editing for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormContext {
    pub mode: FormMode,
    pub used_types: Vec<AddressType>,
    pub address_count: usize,
}

impl FormContext {
    pub fn new_address(used_types: Vec<AddressType>, address_count: usize) -> Self {
        Self {
            mode: FormMode::New,
            used_types,
            address_count,
        }
    }

    /// Context for the account's `existing` addresses, editing `editing` if given.
    pub fn from_addresses(existing: &[Address], editing: Option<&Address>) -> Self {
        Self {
            mode: match editing {
                Some(address) => FormMode::Edit {
                    address_id: address.id,
                    original_type: address.address_type,
                },
                None => FormMode::New,
            },
            used_types: existing.iter().map(|a| a.address_type).collect(),
            address_count: existing.len(),
        }
    }

    pub fn is_edit_mode(&self) -> bool {
        matches!(self.mode, FormMode::Edit { .. })
    }

    fn type_available(&self, wanted: AddressType) -> bool {
        let editing = match self.mode {
            FormMode::Edit { original_type, .. } => Some(original_type),
            FormMode::New => None,
        };
        address_type_available(&self.used_types, wanted, editing)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddressSubmission {
    Create(CreateAddress),
    Update {
        address_id: Uuid,
        data: UpdateAddress,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("Please fill in: {}", join_fields(.0))]
    MissingFields(Vec<AddressField>),
    #[error("A {0} address already exists. Choose a different address type.")]
    TypeTaken(AddressType),
    #[error("You can save at most {} addresses.", MAX_ADDRESSES_PER_ACCOUNT)]
    LimitReached,
    #[error("{0}")]
    Invalid(String),
}

fn join_fields(fields: &[AddressField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything a view needs to render the form.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct FormSnapshot {
    pub draft: AddressDraft,
    pub validation: ValidationState,
    pub zipcode: Option<ZipcodeValidation>,
    pub zipcode_validating: bool,
    pub state_suggestions: Vec<String>,
    pub suggestions_visible: bool,
    #[ts(type = "string | null")]
    pub street_issue: Option<String>,
    pub pincode_issue: Option<PincodeIssue>,
    pub missing_fields: Vec<AddressField>,
    pub is_valid: bool,
}

struct FormState {
    draft: AddressDraft,
    reconciler: SuggestionReconciler,
    state_suggestions: Vec<String>,
    context: FormContext,
}

impl FormState {
    fn is_valid(&self) -> bool {
        let type_available = self.context.type_available(self.draft.address_type);
        self.reconciler.is_address_valid(&self.draft, type_available)
    }

    fn street_issue(&self) -> Option<StreetAddressIssue> {
        if !self.draft.is_us() {
            return None;
        }
        self.reconciler.street_issue(&self.draft)
    }

    fn address_request(&self) -> Option<AddressValidationRequest> {
        let draft = &self.draft;
        let ready = draft.is_us()
            && !draft.street_address.trim().is_empty()
            && !draft.city.trim().is_empty()
            && !draft.state.trim().is_empty()
            && FieldPolicy::ZipcodeLookup.should_validate(&draft.pincode);

        ready.then(|| AddressValidationRequest {
            street: draft.street_address.trim().to_string(),
            city: draft.city.trim().to_string(),
            state: draft.state.trim().to_string(),
            zipcode: draft.pincode.trim().to_string(),
            country: draft.country,
        })
    }

    /// Reason shown when a complete form still fails validation.
    fn invalid_reason(&self) -> String {
        if let Some(issue) = self.draft.pincode_issue() {
            return issue.to_string();
        }
        if let Some(issue) = self.street_issue() {
            return issue.to_string();
        }
        if !self.draft.is_us() {
            return ADDRESS_UNVERIFIED.to_string();
        }
        if let Some(zipcode) = self.reconciler.zipcode() {
            if zipcode.is_confirmed_invalid() {
                if let Some(error) = &zipcode.error {
                    return error.clone();
                }
            }
        }
        let validation = self.reconciler.validation();
        if validation.is_validating || self.reconciler.is_zipcode_validating() {
            return VALIDATION_IN_PROGRESS.to_string();
        }
        validation
            .error
            .clone()
            .unwrap_or_else(|| ADDRESS_UNVERIFIED.to_string())
    }
}

struct FormInner {
    state: Mutex<FormState>,
    api: Arc<dyn AddressApi>,
    zipcode_validator: ZipcodeValidator,
    events: EventBus,
    state_lookup: Debouncer,
    zipcode_lookup: Debouncer,
    address_lookup: Debouncer,
    selection_banner: Debouncer,
    suggestion_auto_hide: Debouncer,
}

impl FormInner {
    fn cancel_lookups(&self) {
        self.state_lookup.cancel();
        self.zipcode_lookup.cancel();
        self.address_lookup.cancel();
    }

    fn cancel_all(&self) {
        self.cancel_lookups();
        self.selection_banner.cancel();
        self.suggestion_auto_hide.cancel();
    }

    fn schedule_state_lookup(self: &Arc<Self>, draft: &AddressDraft) {
        if !draft.is_us() || !FieldPolicy::StateLookup.should_validate(&draft.state) {
            self.state_lookup.cancel();
            return;
        }
        let inner = self.clone();
        self.state_lookup
            .schedule(async move { inner.run_state_lookup().await });
    }

    /// The one place a zipcode (re)validation is scheduled, whether the zipcode
    /// or the state it must belong to changed.
    fn schedule_zipcode_validation(self: &Arc<Self>, draft: &AddressDraft) {
        if !draft.is_us() || !FieldPolicy::ZipcodeLookup.should_validate(&draft.pincode) {
            self.zipcode_lookup.cancel();
            return;
        }
        let inner = self.clone();
        self.zipcode_lookup
            .schedule(async move { inner.run_zipcode_validation().await });
    }

    fn schedule_address_validation(self: &Arc<Self>, state: &FormState) {
        if state.address_request().is_none() {
            self.address_lookup.cancel();
            return;
        }
        let inner = self.clone();
        self.address_lookup
            .schedule(async move { inner.run_address_validation().await });
    }

    async fn run_state_lookup(self: Arc<Self>) {
        let query = {
            let state = self.state.lock().await;
            let query = state.draft.state.trim().to_string();
            if !state.draft.is_us() || !FieldPolicy::StateLookup.should_validate(&query) {
                return;
            }
            query
        };

        let suggestions = match self.api.get_state_suggestions(&query).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!(query = %query, error = %e, "State suggestion lookup failed");
                Vec::new()
            }
        };

        let mut state = self.state.lock().await;
        if state.draft.state.trim() == query {
            debug!(query = %query, count = suggestions.len(), "State suggestions updated");
            state.state_suggestions = suggestions;
        }
    }

    async fn run_zipcode_validation(self: Arc<Self>) {
        let (seq, zipcode, country, region) = {
            let mut state = self.state.lock().await;
            let draft = &state.draft;
            if !draft.is_us() || !FieldPolicy::ZipcodeLookup.should_validate(&draft.pincode) {
                return;
            }
            let zipcode = draft.pincode.trim().to_string();
            let country = draft.country;
            let region = draft.state.trim().to_string();
            (
                state.reconciler.begin_zipcode_validation(),
                zipcode,
                country,
                region,
            )
        };

        debug!(seq, zipcode = %zipcode, state = %region, "Dispatching zipcode validation");
        let result = self
            .zipcode_validator
            .validate(&zipcode, country, &region)
            .await;

        let mut guard = self.state.lock().await;
        let FormState {
            draft, reconciler, ..
        } = &mut *guard;
        let applied = reconciler.apply_zipcode_validation(seq, result, draft);
        if applied == ZipcodeApplied::CityCorrected {
            self.schedule_address_validation(&guard);
        }
    }

    async fn run_address_validation(self: Arc<Self>) {
        let (seq, request) = {
            let mut state = self.state.lock().await;
            let Some(request) = state.address_request() else {
                return;
            };
            (state.reconciler.begin_address_validation(), request)
        };

        debug!(seq, zipcode = %request.zipcode, "Dispatching address validation");
        let result = self.api.validate_address(&request).await;
        if let Err(e) = &result {
            warn!(seq, error = %e, "Address validation request failed");
        }

        let mut state = self.state.lock().await;
        let hide_generation = state.reconciler.apply_address_validation(seq, result);
        if let Some(generation) = hide_generation {
            if state.is_valid() {
                self.schedule_suggestion_auto_hide(generation);
            }
        }
    }

    /// Check a location that was filled in without being typed.
    fn validate_location(self: &Arc<Self>, state: &FormState) {
        self.schedule_zipcode_validation(&state.draft);
        self.schedule_address_validation(state);
    }

    fn schedule_suggestion_auto_hide(self: &Arc<Self>, generation: u64) {
        let inner = self.clone();
        self.suggestion_auto_hide.schedule(async move {
            let mut state = inner.state.lock().await;
            let still_valid = state.is_valid();
            if state.reconciler.hide_suggestions(generation, still_valid) {
                debug!(generation, "Suggestions auto-hidden");
            }
        });
    }

    fn schedule_banner_expiry(self: &Arc<Self>, generation: u64) {
        let inner = self.clone();
        self.selection_banner.schedule(async move {
            inner
                .state
                .lock()
                .await
                .reconciler
                .expire_selection_banner(generation);
        });
    }
}

/// One mounted address form. Dropping it cancels every pending timer; requests
/// already sent are left to finish.
pub struct AddressForm {
    inner: Arc<FormInner>,
}

impl AddressForm {
    pub fn new(
        api: Arc<dyn AddressApi>,
        events: EventBus,
        config: ValidationConfig,
        context: FormContext,
    ) -> Self {
        Self::with_draft(api, events, config, context, AddressDraft::default())
    }

    /// Form pre-populated from an existing address. A US address is re-validated
    /// as soon as the form opens, so it must be built inside a tokio runtime.
    pub fn edit(
        api: Arc<dyn AddressApi>,
        events: EventBus,
        config: ValidationConfig,
        existing: &[Address],
        address: &Address,
    ) -> Self {
        let context = FormContext::from_addresses(existing, Some(address));
        Self::with_draft(api, events, config, context, AddressDraft::from(address))
    }

    pub fn with_draft(
        api: Arc<dyn AddressApi>,
        events: EventBus,
        config: ValidationConfig,
        context: FormContext,
        draft: AddressDraft,
    ) -> Self {
        let inner = FormInner {
            state: Mutex::new(FormState {
                draft,
                reconciler: SuggestionReconciler::default(),
                state_suggestions: Vec::new(),
                context,
            }),
            zipcode_validator: ZipcodeValidator::new(api.clone()),
            api,
            events,
            state_lookup: Debouncer::new(config.state_debounce),
            zipcode_lookup: Debouncer::new(config.zipcode_debounce),
            address_lookup: Debouncer::new(config.address_debounce),
            selection_banner: Debouncer::new(config.selection_banner),
            suggestion_auto_hide: Debouncer::new(config.suggestion_auto_hide),
        };
        let inner = Arc::new(inner);

        // Nothing else can hold the lock yet.
        if let Ok(state) = inner.state.try_lock() {
            inner.validate_location(&state);
        }
        Self { inner }
    }

    pub async fn set_full_name(&self, value: impl Into<String>) {
        self.inner.state.lock().await.draft.full_name = value.into();
    }

    pub async fn set_phone_number(&self, value: impl Into<String>) {
        self.inner.state.lock().await.draft.phone_number = value.into();
    }

    pub async fn set_alternate_phone(&self, value: impl Into<String>) {
        self.inner.state.lock().await.draft.alternate_phone = value.into();
    }

    pub async fn set_address_type(&self, address_type: AddressType) {
        self.inner.state.lock().await.draft.address_type = address_type;
    }

    pub async fn set_default(&self, is_default: bool) {
        self.inner.state.lock().await.draft.is_default = is_default;
    }

    pub async fn set_street_address(&self, value: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        state.draft.street_address = value.into();
        state.reconciler.location_edited(LocationField::Street);
        self.inner.schedule_address_validation(&state);
    }

    pub async fn set_city(&self, value: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        state.draft.city = value.into();
        state.reconciler.location_edited(LocationField::City);
        self.inner.schedule_address_validation(&state);
    }

    /// A new state makes any earlier zipcode verdict stale; the zipcode is
    /// re-checked against it.
    pub async fn set_state(&self, value: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        state.draft.state = value.into();
        state.reconciler.location_edited(LocationField::State);
        self.inner.schedule_state_lookup(&state.draft);
        self.inner.schedule_zipcode_validation(&state.draft);
        self.inner.schedule_address_validation(&state);
    }

    pub async fn set_pincode(&self, value: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        state.draft.pincode = value.into();
        state.reconciler.location_edited(LocationField::Pincode);
        self.inner.schedule_zipcode_validation(&state.draft);
        self.inner.schedule_address_validation(&state);
    }

    pub async fn set_country(&self, country: Country) {
        let mut state = self.inner.state.lock().await;
        state.draft.country = country;
        state.reconciler.location_edited(LocationField::Country);
        if !country.is_united_states() {
            state.state_suggestions.clear();
            self.inner.cancel_lookups();
            return;
        }
        self.inner.schedule_zipcode_validation(&state.draft);
        self.inner.schedule_address_validation(&state);
    }

    /// Pick one of the looked-up state names.
    pub async fn choose_state_suggestion(&self, index: usize) -> bool {
        let chosen = {
            let mut state = self.inner.state.lock().await;
            let chosen = state.state_suggestions.get(index).cloned();
            if chosen.is_some() {
                state.state_suggestions.clear();
            }
            chosen
        };
        match chosen {
            Some(name) => {
                self.set_state(name).await;
                // The chosen name is final; looking it up again is pointless.
                self.inner.state_lookup.cancel();
                true
            }
            None => false,
        }
    }

    /// Apply the address suggestion at `index`. Pending lookups are dropped and
    /// nothing is re-validated until the next edit.
    pub async fn select_suggestion(&self, index: usize) -> bool {
        let mut guard = self.inner.state.lock().await;
        let Some(suggestion) = guard.reconciler.validation().suggestions.get(index).cloned()
        else {
            return false;
        };

        let FormState {
            draft,
            reconciler,
            state_suggestions,
            ..
        } = &mut *guard;
        let generation = reconciler.select_suggestion(&suggestion, draft);
        state_suggestions.clear();

        self.inner.cancel_lookups();
        self.inner.suggestion_auto_hide.cancel();
        self.inner.schedule_banner_expiry(generation);

        info!(
            zipcode = %suggestion.zipcode,
            city = %suggestion.city,
            "Address suggestion applied"
        );
        true
    }

    pub async fn is_form_valid(&self) -> bool {
        self.inner.state.lock().await.is_valid()
    }

    pub async fn snapshot(&self) -> FormSnapshot {
        let state = self.inner.state.lock().await;
        FormSnapshot {
            draft: state.draft.clone(),
            validation: state.reconciler.validation().clone(),
            zipcode: state.reconciler.zipcode().cloned(),
            zipcode_validating: state.reconciler.is_zipcode_validating(),
            state_suggestions: state.state_suggestions.clone(),
            suggestions_visible: state.reconciler.suggestions_visible(),
            street_issue: state.street_issue().map(|issue| issue.to_string()),
            pincode_issue: state.draft.pincode_issue(),
            missing_fields: state.draft.missing_fields(),
            is_valid: state.is_valid(),
        }
    }

    /// Final checks before saving. Address type and account limit failures are
    /// also published as toasts.
    pub async fn submit(&self) -> Result<AddressSubmission, SubmitError> {
        let state = self.inner.state.lock().await;
        let draft = &state.draft;

        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return Err(SubmitError::MissingFields(missing));
        }

        if !state.context.is_edit_mode() && state.context.address_count >= MAX_ADDRESSES_PER_ACCOUNT
        {
            return Err(self.reject(SubmitError::LimitReached));
        }

        if !state.context.type_available(draft.address_type) {
            return Err(self.reject(SubmitError::TypeTaken(draft.address_type)));
        }

        if !state.is_valid() {
            return Err(SubmitError::Invalid(state.invalid_reason()));
        }

        Ok(match state.context.mode {
            FormMode::New => AddressSubmission::Create(draft.to_create()),
            FormMode::Edit { address_id, .. } => AddressSubmission::Update {
                address_id,
                data: draft.to_update(),
            },
        })
    }

    fn reject(&self, error: SubmitError) -> SubmitError {
        warn!(error = %error, "Address submission rejected");
        self.inner
            .events
            .toast(Toast::error(error.to_string()).with_title("Cannot save address"));
        error
    }
}

impl Drop for AddressForm {
    fn drop(&mut self) {
        self.inner.cancel_all();
    }
}
