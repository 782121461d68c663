//! Editable copy of an address, owned by a single form.

use std::str::FromStr;

use db::models::address::{Address, AddressType, Country, CreateAddress, UpdateAddress};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;
use ts_rs::TS;

use super::{address_api::AddressSuggestion, debounce::US_ZIPCODE_LEN};

/// Fields that must be non-blank before the address can be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "snake_case")]
pub enum AddressField {
    #[strum(serialize = "Full name")]
    FullName,
    #[strum(serialize = "Phone number")]
    PhoneNumber,
    #[strum(serialize = "Pincode")]
    Pincode,
    #[strum(serialize = "State")]
    State,
    #[strum(serialize = "City")]
    City,
    #[strum(serialize = "Street address")]
    StreetAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
pub enum PincodeIssue {
    #[error("Zipcode must contain digits only.")]
    NonDigit,
    #[error("Zipcode must be exactly 5 digits.")]
    WrongLength,
    #[error("Pincode may only contain letters and numbers.")]
    InvalidCharacters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct AddressDraft {
    pub full_name: String,
    pub phone_number: String,
    pub alternate_phone: String,
    pub pincode: String,
    pub state: String,
    pub city: String,
    pub street_address: String,
    pub address_type: AddressType,
    pub country: Country,
    pub is_default: bool,
}

impl From<&Address> for AddressDraft {
    fn from(address: &Address) -> Self {
        Self {
            full_name: address.full_name.clone(),
            phone_number: address.phone_number.clone(),
            alternate_phone: address.alternate_phone.clone().unwrap_or_default(),
            pincode: address.pincode.clone(),
            state: address.state.clone(),
            city: address.city.clone(),
            street_address: address.street_address.clone(),
            address_type: address.address_type,
            country: address.country,
            is_default: address.is_default,
        }
    }
}

impl AddressDraft {
    pub fn is_us(&self) -> bool {
        self.country.is_united_states()
    }

    pub fn missing_fields(&self) -> Vec<AddressField> {
        [
            (AddressField::FullName, &self.full_name),
            (AddressField::PhoneNumber, &self.phone_number),
            (AddressField::Pincode, &self.pincode),
            (AddressField::State, &self.state),
            (AddressField::City, &self.city),
            (AddressField::StreetAddress, &self.street_address),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    pub fn basic_fields_present(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Character-set check of the pincode. A blank pincode is reported by
    /// [`Self::missing_fields`] instead.
    pub fn pincode_issue(&self) -> Option<PincodeIssue> {
        let pincode = self.pincode.trim();
        if pincode.is_empty() {
            return None;
        }

        if self.is_us() {
            if !pincode.bytes().all(|b| b.is_ascii_digit()) {
                Some(PincodeIssue::NonDigit)
            } else if pincode.len() != US_ZIPCODE_LEN {
                Some(PincodeIssue::WrongLength)
            } else {
                None
            }
        } else if pincode.bytes().all(|b| b.is_ascii_alphanumeric()) {
            None
        } else {
            Some(PincodeIssue::InvalidCharacters)
        }
    }

    /// Overwrite the location fields with a suggestion, verbatim.
    pub fn apply_suggestion(&mut self, suggestion: &AddressSuggestion) {
        self.street_address = suggestion.street_line();
        self.city = suggestion.city.clone();
        self.state = suggestion.state.clone();
        self.pincode = suggestion.zipcode.clone();
        if let Ok(country) = Country::from_str(suggestion.country.trim()) {
            self.country = country;
        }
    }

    pub fn to_create(&self) -> CreateAddress {
        CreateAddress {
            full_name: self.full_name.trim().to_string(),
            phone_number: self.phone_number.trim().to_string(),
            alternate_phone: non_blank(&self.alternate_phone),
            pincode: self.pincode.trim().to_string(),
            state: self.state.trim().to_string(),
            city: self.city.trim().to_string(),
            street_address: self.street_address.trim().to_string(),
            address_type: self.address_type,
            country: self.country,
            is_default: self.is_default,
        }
    }

    pub fn to_update(&self) -> UpdateAddress {
        let create = self.to_create();
        UpdateAddress {
            full_name: create.full_name,
            phone_number: create.phone_number,
            alternate_phone: create.alternate_phone,
            pincode: create.pincode,
            state: create.state,
            city: create.city,
            street_address: create.street_address,
            address_type: create.address_type,
            country: create.country,
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Whether `wanted` can be used given the types an account already holds.
///
/// `editing` is the current type of the address being edited, which does not
/// count against itself.
pub fn address_type_available(
    used: &[AddressType],
    wanted: AddressType,
    editing: Option<AddressType>,
) -> bool {
    if !wanted.is_singleton() || editing == Some(wanted) {
        return true;
    }
    !used.contains(&wanted)
}
