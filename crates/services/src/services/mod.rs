pub mod address_api;
pub mod address_book;
pub mod address_draft;
pub mod address_form;
pub mod config;
pub mod debounce;
pub mod street_heuristic;
pub mod suggestion_reconciler;
pub mod zipcode_validator;

#[cfg(test)]
pub(crate) mod test_support;
