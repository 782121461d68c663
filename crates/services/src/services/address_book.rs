//! Persistence rules for an account's saved addresses.

use db::models::address::{
    Address, AddressType, CreateAddress, UpdateAddress, is_limit_violation, is_type_violation,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::address_draft::AddressField;

/// An account may keep at most this many addresses.
pub const MAX_ADDRESSES_PER_ACCOUNT: usize = 5;

#[derive(Debug, Error)]
pub enum AddressBookError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("address not found")]
    NotFound,
    #[error("You can save at most {} addresses.", MAX_ADDRESSES_PER_ACCOUNT)]
    LimitReached,
    #[error("A {0} address already exists. Choose a different address type.")]
    TypeTaken(AddressType),
    #[error("{0} is required")]
    MissingField(AddressField),
}

impl AddressBookError {
    /// Concurrent writers can pass the checks together; the database constraints
    /// catch the loser.
    fn from_write(err: sqlx::Error, address_type: AddressType) -> Self {
        if is_type_violation(&err) {
            Self::TypeTaken(address_type)
        } else if is_limit_violation(&err) {
            Self::LimitReached
        } else {
            Self::Database(err)
        }
    }
}

#[derive(Clone)]
pub struct AddressBookService {
    pool: SqlitePool,
}

impl AddressBookService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Default address first, then oldest first.
    pub async fn list(&self, account_id: Uuid) -> Result<Vec<Address>, AddressBookError> {
        Ok(Address::find_by_account_id(&self.pool, account_id).await?)
    }

    pub async fn get(&self, account_id: Uuid, id: Uuid) -> Result<Address, AddressBookError> {
        match Address::find_by_id(&self.pool, id).await? {
            Some(address) if address.account_id == account_id => Ok(address),
            _ => Err(AddressBookError::NotFound),
        }
    }

    /// The first address of an account always becomes its default.
    pub async fn create(
        &self,
        account_id: Uuid,
        data: CreateAddress,
    ) -> Result<Address, AddressBookError> {
        check_required(&[
            (AddressField::FullName, &data.full_name),
            (AddressField::PhoneNumber, &data.phone_number),
            (AddressField::Pincode, &data.pincode),
            (AddressField::State, &data.state),
            (AddressField::City, &data.city),
            (AddressField::StreetAddress, &data.street_address),
        ])?;

        let mut tx = self.pool.begin().await?;
        let count = Address::count_by_account_id(&mut *tx, account_id).await?;
        if count >= MAX_ADDRESSES_PER_ACCOUNT as i64 {
            return Err(AddressBookError::LimitReached);
        }
        ensure_type_available(&mut tx, account_id, data.address_type, None).await?;

        let data = CreateAddress {
            is_default: data.is_default || count == 0,
            ..data
        };
        if data.is_default {
            Address::clear_default(&mut *tx, account_id).await?;
        }
        let address = Address::create(&mut *tx, account_id, &data)
            .await
            .map_err(|e| AddressBookError::from_write(e, data.address_type))?;
        tx.commit().await?;

        info!(
            account_id = %account_id,
            address_id = %address.id,
            address_type = %address.address_type,
            "Address created"
        );
        Ok(address)
    }

    pub async fn update(
        &self,
        account_id: Uuid,
        id: Uuid,
        data: UpdateAddress,
    ) -> Result<Address, AddressBookError> {
        check_required(&[
            (AddressField::FullName, &data.full_name),
            (AddressField::PhoneNumber, &data.phone_number),
            (AddressField::Pincode, &data.pincode),
            (AddressField::State, &data.state),
            (AddressField::City, &data.city),
            (AddressField::StreetAddress, &data.street_address),
        ])?;

        self.get(account_id, id).await?;

        let mut tx = self.pool.begin().await?;
        ensure_type_available(&mut tx, account_id, data.address_type, Some(id)).await?;
        let address = Address::update(&mut *tx, id, &data)
            .await
            .map_err(|e| AddressBookError::from_write(e, data.address_type))?
            .ok_or(AddressBookError::NotFound)?;
        tx.commit().await?;
        debug!(address_id = %id, "Address updated");
        Ok(address)
    }

    /// Deleting the default address promotes the oldest remaining one.
    pub async fn delete(&self, account_id: Uuid, id: Uuid) -> Result<(), AddressBookError> {
        let address = self.get(account_id, id).await?;
        if Address::delete(&self.pool, id).await? == 0 {
            return Err(AddressBookError::NotFound);
        }

        if address.is_default {
            let oldest = Address::find_oldest_by_account_id(&self.pool, account_id).await?;
            if let Some(oldest) = oldest {
                Address::set_default(&self.pool, account_id, oldest.id).await?;
                info!(address_id = %oldest.id, "Promoted address to default");
            }
        }

        info!(account_id = %account_id, address_id = %id, "Address deleted");
        Ok(())
    }

    pub async fn set_default(
        &self,
        account_id: Uuid,
        id: Uuid,
    ) -> Result<Address, AddressBookError> {
        Address::set_default(&self.pool, account_id, id)
            .await?
            .ok_or(AddressBookError::NotFound)
    }
}

async fn ensure_type_available(
    tx: &mut Transaction<'_, Sqlite>,
    account_id: Uuid,
    wanted: AddressType,
    excluding: Option<Uuid>,
) -> Result<(), AddressBookError> {
    if !wanted.is_singleton() {
        return Ok(());
    }
    let used = Address::used_types(&mut **tx, account_id, excluding).await?;
    if used.contains(&wanted) {
        return Err(AddressBookError::TypeTaken(wanted));
    }
    Ok(())
}

fn check_required(fields: &[(AddressField, &String)]) -> Result<(), AddressBookError> {
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((field, _)) => Err(AddressBookError::MissingField(*field)),
        None => Ok(()),
    }
}
