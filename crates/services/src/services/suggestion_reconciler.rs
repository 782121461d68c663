//! Merges local checks and remote verdicts into one "may this address be submitted" signal.
//!
//! The reconciler is plain state: it never performs I/O or starts timers. The form
//! asks it for sequence numbers before dispatching a request, hands responses back
//! with those numbers, and forwards timer expiries tagged with a generation.

use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;

use super::{
    address_api::{AddressApiError, AddressSuggestion, AddressValidationResponse},
    address_draft::AddressDraft,
    street_heuristic::{StreetAddressIssue, street_address_issue},
    zipcode_validator::ZipcodeValidation,
};

pub const ADDRESS_LOOKUP_FAILED: &str = "Error validating address. Please try again.";
const ADDRESS_NOT_VERIFIED: &str = "We could not verify this address.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct ValidationState {
    pub is_validating: bool,
    pub is_valid: Option<bool>,
    pub suggestions: Vec<AddressSuggestion>,
    pub error: Option<String>,
    pub suggestion_selected: bool,
}

/// Hands out increasing sequence numbers and rejects responses older than the
/// newest one applied, or issued before the last invalidation.
#[derive(Debug, Clone, Default)]
pub struct RequestSequencer {
    issued: u64,
    floor: u64,
}

impl RequestSequencer {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn accept(&mut self, seq: u64) -> bool {
        if seq == 0 || seq > self.issued || seq < self.floor {
            return false;
        }
        self.floor = seq;
        true
    }

    /// Every request issued so far becomes stale.
    pub fn invalidate(&mut self) {
        self.floor = self.issued + 1;
    }

    pub fn is_latest(&self, seq: u64) -> bool {
        seq == self.issued
    }
}

/// Which location field the user changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationField {
    Street,
    City,
    State,
    Pincode,
    Country,
}

/// What applying a zipcode verdict changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipcodeApplied {
    Stale,
    Recorded,
    /// The confirmed city replaced the typed one; the address verdict was reset.
    CityCorrected,
}

#[derive(Debug, Clone, Default)]
pub struct SuggestionReconciler {
    validation: ValidationState,
    zipcode: Option<ZipcodeValidation>,
    zipcode_validating: bool,
    address_requests: RequestSequencer,
    zipcode_requests: RequestSequencer,
    /// Street line of the last accepted suggestion, while the user has not edited it.
    accepted_street: Option<String>,
    banner_generation: u64,
    hide_generation: u64,
    suggestions_hidden: bool,
}

impl SuggestionReconciler {
    pub fn validation(&self) -> &ValidationState {
        &self.validation
    }

    pub fn zipcode(&self) -> Option<&ZipcodeValidation> {
        self.zipcode.as_ref()
    }

    pub fn is_zipcode_validating(&self) -> bool {
        self.zipcode_validating
    }

    pub fn suggestions_visible(&self) -> bool {
        !self.validation.suggestions.is_empty()
            && !self.validation.is_validating
            && !self.suggestions_hidden
    }

    /// Heuristic verdict on the street line, or `None` when it does not apply.
    pub fn street_issue(&self, draft: &AddressDraft) -> Option<StreetAddressIssue> {
        if self.heuristic_waived(draft) {
            return None;
        }
        street_address_issue(&draft.street_address)
    }

    fn heuristic_waived(&self, draft: &AddressDraft) -> bool {
        self.validation.suggestion_selected
            || self.accepted_street.as_deref() == Some(draft.street_address.as_str())
    }

    /// Overall validity of `draft`. `type_available` is whether its address type may
    /// be used by this account.
    pub fn is_address_valid(&self, draft: &AddressDraft, type_available: bool) -> bool {
        let basic = draft.basic_fields_present();

        if !draft.is_us() {
            return basic && draft.pincode_issue().is_none() && type_available;
        }

        if self.validation.suggestion_selected && self.validation.is_valid == Some(true) {
            return basic && type_available;
        }

        if self.street_issue(draft).is_some() {
            return false;
        }

        let zipcode_not_rejected = !self
            .zipcode
            .as_ref()
            .is_some_and(ZipcodeValidation::is_confirmed_invalid);

        basic
            && draft.pincode_issue().is_none()
            && zipcode_not_rejected
            && self.validation.is_valid == Some(true)
            && type_available
    }

    /// A user edit. Remote verdicts that depended on the old value are dropped,
    /// including any still in flight.
    pub fn location_edited(&mut self, field: LocationField) {
        self.validation.is_valid = None;
        self.validation.is_validating = false;
        self.validation.error = None;
        self.address_requests.invalidate();

        match field {
            LocationField::Street => {
                self.validation.suggestion_selected = false;
                self.accepted_street = None;
            }
            LocationField::State | LocationField::Pincode | LocationField::Country => {
                self.reset_zipcode();
            }
            LocationField::City => {}
        }
    }

    fn reset_zipcode(&mut self) {
        self.zipcode = None;
        self.zipcode_validating = false;
        self.zipcode_requests.invalidate();
    }

    pub fn begin_address_validation(&mut self) -> u64 {
        self.validation.is_validating = true;
        self.address_requests.issue()
    }

    /// Apply a full-address response. Returns the auto-hide generation when the
    /// response was applied and carried suggestions.
    pub fn apply_address_validation(
        &mut self,
        seq: u64,
        result: Result<AddressValidationResponse, AddressApiError>,
    ) -> Option<u64> {
        if !self.address_requests.accept(seq) {
            debug!(seq, "Dropping stale address validation response");
            return None;
        }
        if self.address_requests.is_latest(seq) {
            self.validation.is_validating = false;
        }

        match result {
            Ok(response) => {
                self.validation.is_valid = Some(response.valid);
                self.validation.error = if response.valid {
                    None
                } else {
                    Some(
                        response
                            .error
                            .unwrap_or_else(|| ADDRESS_NOT_VERIFIED.to_string()),
                    )
                };
                self.validation.suggestions = response.suggestions;
            }
            Err(AddressApiError::Verdict(verdict)) => {
                self.validation.is_valid = Some(verdict.valid);
                self.validation.error = verdict.error;
                self.validation.suggestions.clear();
            }
            Err(_) => {
                self.validation.is_valid = None;
                self.validation.error = Some(ADDRESS_LOOKUP_FAILED.to_string());
                self.validation.suggestions.clear();
            }
        }

        self.suggestions_hidden = false;
        self.hide_generation += 1;
        (!self.validation.suggestions.is_empty()).then_some(self.hide_generation)
    }

    pub fn begin_zipcode_validation(&mut self) -> u64 {
        self.zipcode_validating = true;
        self.zipcode_requests.issue()
    }

    /// Apply a zipcode verdict. A confirmed zipcode's city replaces the typed city,
    /// which counts as a city edit.
    pub fn apply_zipcode_validation(
        &mut self,
        seq: u64,
        result: ZipcodeValidation,
        draft: &mut AddressDraft,
    ) -> ZipcodeApplied {
        if !self.zipcode_requests.accept(seq) {
            debug!(seq, "Dropping stale zipcode validation response");
            return ZipcodeApplied::Stale;
        }
        if self.zipcode_requests.is_latest(seq) {
            self.zipcode_validating = false;
        }

        let mut outcome = ZipcodeApplied::Recorded;
        if result.is_valid == Some(true) {
            if let Some(city) = &result.city {
                if draft.city != *city {
                    debug!(from = %draft.city, to = %city, "City corrected from zipcode");
                    draft.city = city.clone();
                    self.location_edited(LocationField::City);
                    outcome = ZipcodeApplied::CityCorrected;
                }
            }
        }
        self.zipcode = Some(result);
        outcome
    }

    /// Apply a suggestion to `draft` in one step. Returns the banner generation to
    /// pass back to [`Self::expire_selection_banner`].
    pub fn select_suggestion(
        &mut self,
        suggestion: &AddressSuggestion,
        draft: &mut AddressDraft,
    ) -> u64 {
        draft.apply_suggestion(suggestion);

        self.validation.suggestions.clear();
        self.reset_zipcode();
        self.address_requests.invalidate();

        self.validation.is_validating = false;
        self.validation.is_valid = Some(true);
        self.validation.error = None;
        self.validation.suggestion_selected = true;
        self.accepted_street = Some(draft.street_address.clone());

        self.banner_generation += 1;
        self.banner_generation
    }

    pub fn expire_selection_banner(&mut self, generation: u64) {
        if generation == self.banner_generation {
            self.validation.suggestion_selected = false;
        }
    }

    /// Hide suggestions if `generation` is still current and the address is valid.
    pub fn hide_suggestions(&mut self, generation: u64, still_valid: bool) -> bool {
        if generation != self.hide_generation || !still_valid {
            return false;
        }
        self.suggestions_hidden = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use db::models::address::{AddressType, Country};

    use super::*;
    use crate::services::{address_api::ZipcodeVerdict, test_support::empire_state_suggestion};

    fn us_draft() -> AddressDraft {
        AddressDraft {
            full_name: "Jane Doe".to_string(),
            phone_number: "2125550100".to_string(),
            pincode: "10001".to_string(),
            state: "New York".to_string(),
            city: "New York".to_string(),
            street_address: "11 West 34th Street".to_string(),
            address_type: AddressType::Home,
            country: Country::UnitedStates,
            ..Default::default()
        }
    }

    fn confirmed(reconciler: &mut SuggestionReconciler, suggestions: Vec<AddressSuggestion>) {
        let seq = reconciler.begin_address_validation();
        reconciler.apply_address_validation(
            seq,
            Ok(AddressValidationResponse {
                valid: true,
                suggestions,
                error: None,
            }),
        );
    }

    #[test]
    fn sequencer_rejects_out_of_order_and_invalidated_responses() {
        let mut sequencer = RequestSequencer::default();
        let first = sequencer.issue();
        let second = sequencer.issue();
        assert!(sequencer.accept(second));
        assert!(!sequencer.accept(first));

        let third = sequencer.issue();
        sequencer.invalidate();
        assert!(!sequencer.accept(third));
        let fourth = sequencer.issue();
        assert!(sequencer.accept(fourth));
        assert!(!sequencer.accept(99));
    }

    #[test]
    fn stale_address_response_does_not_overwrite_fresher_one() {
        let mut reconciler = SuggestionReconciler::default();
        let older = reconciler.begin_address_validation();
        let newer = reconciler.begin_address_validation();

        reconciler.apply_address_validation(
            newer,
            Ok(AddressValidationResponse {
                valid: true,
                suggestions: vec![],
                error: None,
            }),
        );
        reconciler.apply_address_validation(
            older,
            Ok(AddressValidationResponse {
                valid: false,
                suggestions: vec![],
                error: Some("old".to_string()),
            }),
        );

        assert_eq!(reconciler.validation().is_valid, Some(true));
        assert!(!reconciler.validation().is_validating);
    }

    #[test]
    fn older_response_keeps_the_loading_flag_for_a_newer_request() {
        let mut reconciler = SuggestionReconciler::default();
        let older = reconciler.begin_address_validation();
        let _newer = reconciler.begin_address_validation();
        reconciler.apply_address_validation(older, Err(AddressApiError::Timeout));
        assert!(reconciler.validation().is_validating);
    }

    #[test]
    fn valid_when_all_signals_agree() {
        let mut reconciler = SuggestionReconciler::default();
        let draft = us_draft();
        assert!(!reconciler.is_address_valid(&draft, true));

        confirmed(&mut reconciler, vec![]);
        assert!(reconciler.is_address_valid(&draft, true));
        assert!(!reconciler.is_address_valid(&draft, false));
    }

    #[test]
    fn heuristic_failure_blocks_even_with_remote_approval() {
        let mut reconciler = SuggestionReconciler::default();
        confirmed(&mut reconciler, vec![]);
        let mut draft = us_draft();
        draft.street_address = "Apartment Complex".to_string();
        assert_eq!(
            reconciler.street_issue(&draft),
            Some(StreetAddressIssue::MissingStreetName)
        );
        assert!(!reconciler.is_address_valid(&draft, true));
    }

    #[test]
    fn rejected_zipcode_blocks_but_unknown_zipcode_does_not() {
        let mut reconciler = SuggestionReconciler::default();
        let mut draft = us_draft();
        confirmed(&mut reconciler, vec![]);

        let seq = reconciler.begin_zipcode_validation();
        reconciler.apply_zipcode_validation(seq, ZipcodeValidation::default(), &mut draft);
        assert!(reconciler.is_address_valid(&draft, true));

        let seq = reconciler.begin_zipcode_validation();
        let rejected = ZipcodeVerdict {
            valid: false,
            city: None,
            state: None,
            error: Some("wrong state".to_string()),
        };
        reconciler.apply_zipcode_validation(seq, rejected.into(), &mut draft);
        assert!(!reconciler.is_address_valid(&draft, true));
    }

    #[test]
    fn confirmed_zipcode_overwrites_city() {
        let mut reconciler = SuggestionReconciler::default();
        let mut draft = us_draft();
        draft.city = "Manhatan".to_string();

        let seq = reconciler.begin_zipcode_validation();
        let verdict = ZipcodeVerdict {
            valid: true,
            city: Some("New York".to_string()),
            state: Some("NY".to_string()),
            error: None,
        };
        assert_eq!(
            reconciler.apply_zipcode_validation(seq, verdict.into(), &mut draft),
            ZipcodeApplied::CityCorrected
        );
        assert_eq!(draft.city, "New York");
        assert!(!reconciler.is_zipcode_validating());
    }

    #[test]
    fn corrected_city_discards_the_address_verdict_for_the_old_city() {
        let mut reconciler = SuggestionReconciler::default();
        let mut draft = us_draft();
        draft.city = "Manhatan".to_string();

        let in_flight = reconciler.begin_address_validation();
        let seq = reconciler.begin_address_validation();
        reconciler.apply_address_validation(
            seq,
            Ok(AddressValidationResponse {
                valid: false,
                suggestions: vec![],
                error: Some("City does not match zipcode".to_string()),
            }),
        );

        let seq = reconciler.begin_zipcode_validation();
        let verdict = ZipcodeVerdict {
            valid: true,
            city: Some("New York".to_string()),
            state: Some("NY".to_string()),
            error: None,
        };
        reconciler.apply_zipcode_validation(seq, verdict.clone().into(), &mut draft);

        assert_eq!(reconciler.validation().is_valid, None);
        assert!(reconciler.validation().error.is_none());
        assert_eq!(reconciler.zipcode().and_then(|z| z.is_valid), Some(true));
        // A response computed for the old city stays dropped.
        let late = Ok(AddressValidationResponse {
            valid: false,
            suggestions: vec![],
            error: None,
        });
        assert_eq!(reconciler.apply_address_validation(in_flight, late), None);
        assert_eq!(reconciler.validation().is_valid, None);

        // Same city again: nothing to re-check.
        let seq = reconciler.begin_zipcode_validation();
        assert_eq!(
            reconciler.apply_zipcode_validation(seq, verdict.into(), &mut draft),
            ZipcodeApplied::Recorded
        );
    }

    #[test]
    fn state_change_discards_a_previously_valid_zipcode() {
        let mut reconciler = SuggestionReconciler::default();
        let mut draft = us_draft();
        confirmed(&mut reconciler, vec![]);
        let seq = reconciler.begin_zipcode_validation();
        let verdict = ZipcodeVerdict {
            valid: true,
            city: Some("New York".to_string()),
            state: Some("NY".to_string()),
            error: None,
        };
        reconciler.apply_zipcode_validation(seq, verdict.clone().into(), &mut draft);
        assert!(reconciler.is_address_valid(&draft, true));

        let in_flight = reconciler.begin_zipcode_validation();
        draft.state = "California".to_string();
        reconciler.location_edited(LocationField::State);

        assert!(reconciler.zipcode().is_none());
        assert_eq!(reconciler.validation().is_valid, None);
        assert!(!reconciler.is_address_valid(&draft, true));

        // A response to the request made under the old state is ignored.
        assert_eq!(
            reconciler.apply_zipcode_validation(in_flight, verdict.into(), &mut draft),
            ZipcodeApplied::Stale
        );
        assert!(reconciler.zipcode().is_none());
    }

    #[test]
    fn transport_error_leaves_validity_unknown() {
        let mut reconciler = SuggestionReconciler::default();
        let seq = reconciler.begin_address_validation();
        reconciler.apply_address_validation(seq, Err(AddressApiError::Transport("reset".into())));

        assert_eq!(reconciler.validation().is_valid, None);
        assert_eq!(
            reconciler.validation().error.as_deref(),
            Some(ADDRESS_LOOKUP_FAILED)
        );
    }

    #[test]
    fn selecting_a_suggestion_is_atomic_and_idempotent() {
        let mut reconciler = SuggestionReconciler::default();
        let mut draft = us_draft();
        let seq = reconciler.begin_address_validation();
        reconciler.apply_address_validation(
            seq,
            Ok(AddressValidationResponse {
                valid: false,
                suggestions: vec![empire_state_suggestion()],
                error: None,
            }),
        );
        assert!(reconciler.suggestions_visible());

        let suggestion = empire_state_suggestion();
        reconciler.select_suggestion(&suggestion, &mut draft);
        let once = draft.clone();
        assert_eq!(draft.street_address, "350 5th Ave");
        assert_eq!(draft.pincode, "10118");
        assert!(reconciler.validation().suggestions.is_empty());
        assert!(reconciler.validation().suggestion_selected);
        assert!(reconciler.zipcode().is_none());
        assert!(reconciler.is_address_valid(&draft, true));

        reconciler.select_suggestion(&suggestion, &mut draft);
        assert_eq!(draft, once);
        assert!(reconciler.is_address_valid(&draft, true));
    }

    #[test]
    fn editing_the_street_clears_the_selection_immediately() {
        let mut reconciler = SuggestionReconciler::default();
        let mut draft = us_draft();
        let generation = reconciler.select_suggestion(&empire_state_suggestion(), &mut draft);

        draft.street_address.push_str(" Floor 86");
        reconciler.location_edited(LocationField::Street);
        assert!(!reconciler.validation().suggestion_selected);
        assert_eq!(reconciler.validation().is_valid, None);

        // The banner timer firing later changes nothing.
        reconciler.expire_selection_banner(generation);
        assert!(!reconciler.validation().suggestion_selected);
    }

    #[test]
    fn accepted_suggestion_keeps_waiving_the_heuristic_after_the_banner() {
        let mut reconciler = SuggestionReconciler::default();
        let mut draft = us_draft();
        let mut suggestion = empire_state_suggestion();
        suggestion.street = "PO Box 9".to_string();

        let generation = reconciler.select_suggestion(&suggestion, &mut draft);
        reconciler.expire_selection_banner(generation);
        assert!(!reconciler.validation().suggestion_selected);
        assert_eq!(reconciler.street_issue(&draft), None);
        assert!(reconciler.is_address_valid(&draft, true));
    }

    #[test]
    fn stale_banner_generation_is_ignored() {
        let mut reconciler = SuggestionReconciler::default();
        let mut draft = us_draft();
        let first = reconciler.select_suggestion(&empire_state_suggestion(), &mut draft);
        let _second = reconciler.select_suggestion(&empire_state_suggestion(), &mut draft);
        reconciler.expire_selection_banner(first);
        assert!(reconciler.validation().suggestion_selected);
    }

    #[test]
    fn suggestions_auto_hide_only_when_valid_and_current() {
        let mut reconciler = SuggestionReconciler::default();
        let seq = reconciler.begin_address_validation();
        let generation = reconciler
            .apply_address_validation(seq, Ok(AddressValidationResponse {
                valid: true,
                suggestions: vec![empire_state_suggestion()],
                error: None,
            }))
            .unwrap();

        assert!(!reconciler.hide_suggestions(generation, false));
        assert!(reconciler.suggestions_visible());
        assert!(!reconciler.hide_suggestions(generation + 1, true));
        assert!(reconciler.hide_suggestions(generation, true));
        assert!(!reconciler.suggestions_visible());
    }

    #[test]
    fn suggestions_are_hidden_while_validating() {
        let mut reconciler = SuggestionReconciler::default();
        confirmed(&mut reconciler, vec![empire_state_suggestion()]);
        assert!(reconciler.suggestions_visible());
        reconciler.begin_address_validation();
        assert!(!reconciler.suggestions_visible());
    }

    #[test]
    fn non_us_addresses_only_need_fields_and_pincode_charset() {
        let reconciler = SuggestionReconciler::default();
        let mut draft = us_draft();
        draft.country = Country::India;
        draft.pincode = "560001".to_string();
        draft.street_address = "Flat 2".to_string();
        assert!(reconciler.is_address_valid(&draft, true));

        draft.pincode = "560-001".to_string();
        assert!(!reconciler.is_address_valid(&draft, true));
    }
}
