//! Offline plausibility check for free-text street addresses.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const MIN_STREET_ADDRESS_LEN: usize = 10;

static HOUSE_NUMBER_THEN_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\s+[A-Za-z]+").expect("valid regex"));

static STREET_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:street|st|road|rd|avenue|ave|av|boulevard|blvd|lane|ln|drive|dr|court|ct|place|pl|way|circle|cir|parkway|pkwy|highway|hwy|terrace|ter|trail|trl|square|sq|crescent|cres|alley|aly|plaza|plz|route|rte|expressway|expy|freeway|fwy|pike|row|walk|loop)\b",
    )
    .expect("valid regex")
});

static DIRECTIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:north|south|east|west|northeast|northwest|southeast|southwest|n|s|e|w|ne|nw|se|sw)\b",
    )
    .expect("valid regex")
});

static ORDINAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:[1-9]|[12]\d|3[01])(?:st|nd|rd|th)\b").expect("valid regex")
});

/// Why a street address looks implausible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreetAddressIssue {
    #[error("Street address is required.")]
    Required,
    #[error("Street address is too short. Include the house number and street name.")]
    TooShort,
    #[error("Please include the actual street name (for example \"123 Main Street\").")]
    MissingStreetName,
}

/// Returns `None` when the address passes.
///
/// A leading house number followed by a word is accepted outright. Otherwise the
/// address must mention a street type, a direction, or an ordinal such as "5th".
pub fn street_address_issue(address: &str) -> Option<StreetAddressIssue> {
    let address = address.trim();

    if address.is_empty() {
        return Some(StreetAddressIssue::Required);
    }
    if address.chars().count() < MIN_STREET_ADDRESS_LEN {
        return Some(StreetAddressIssue::TooShort);
    }
    if HOUSE_NUMBER_THEN_WORD.is_match(address) {
        return None;
    }

    let names_a_street = STREET_TYPE.is_match(address)
        || DIRECTIONAL.is_match(address)
        || ORDINAL.is_match(address);

    if names_a_street {
        None
    } else {
        Some(StreetAddressIssue::MissingStreetName)
    }
}
