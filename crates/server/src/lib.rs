use db::DBService;
use services::services::address_book::AddressBookService;

pub mod config;
pub mod error;
pub mod routes;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    address_book: AddressBookService,
}

impl AppState {
    pub fn new(db: DBService) -> Self {
        let address_book = AddressBookService::new(db.pool.clone());
        Self { db, address_book }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn address_book(&self) -> &AddressBookService {
        &self.address_book
    }
}
