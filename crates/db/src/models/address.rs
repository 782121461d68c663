use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumIter, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Kind of address. `Home` and `Work` may exist at most once per account.
#[derive(
    Debug,
    Clone,
    Copy,
    Type,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    TS,
    EnumString,
    Display,
    EnumIter,
    Default,
)]
#[sqlx(type_name = "address_type")]
pub enum AddressType {
    #[default]
    Home,
    Work,
    Other,
}

impl AddressType {
    /// Whether an account may hold at most one address of this type.
    pub fn is_singleton(self) -> bool {
        matches!(self, AddressType::Home | AddressType::Work)
    }
}

/// Supported countries, stored and serialized by display name.
#[derive(
    Debug,
    Clone,
    Copy,
    Type,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    TS,
    EnumString,
    Display,
    EnumIter,
    Default,
)]
#[sqlx(type_name = "country")]
pub enum Country {
    #[default]
    India,
    #[serde(rename = "United States")]
    #[sqlx(rename = "United States")]
    #[strum(serialize = "United States", serialize = "US", serialize = "USA")]
    UnitedStates,
    #[serde(rename = "United Kingdom")]
    #[sqlx(rename = "United Kingdom")]
    #[strum(serialize = "United Kingdom", serialize = "UK")]
    UnitedKingdom,
    Canada,
    Australia,
    Germany,
    France,
    Singapore,
    #[serde(rename = "United Arab Emirates")]
    #[sqlx(rename = "United Arab Emirates")]
    #[strum(serialize = "United Arab Emirates", serialize = "UAE")]
    UnitedArabEmirates,
}

impl Country {
    pub fn is_united_states(self) -> bool {
        self == Country::UnitedStates
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Address {
    pub id: Uuid,
    pub account_id: Uuid,
    pub full_name: String,
    pub phone_number: String,
    pub alternate_phone: Option<String>,
    pub pincode: String,
    pub state: String,
    pub city: String,
    pub street_address: String,
    pub address_type: AddressType,
    pub country: Country,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct CreateAddress {
    pub full_name: String,
    pub phone_number: String,
    pub alternate_phone: Option<String>,
    pub pincode: String,
    pub state: String,
    pub city: String,
    pub street_address: String,
    pub address_type: AddressType,
    pub country: Country,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct UpdateAddress {
    pub full_name: String,
    pub phone_number: String,
    pub alternate_phone: Option<String>,
    pub pincode: String,
    pub state: String,
    pub city: String,
    pub street_address: String,
    pub address_type: AddressType,
    pub country: Country,
}

/// Raised by the `addresses_limit_per_account` trigger.
const LIMIT_REACHED_MESSAGE: &str = "address limit reached";

/// Whether an insert was refused because the account already holds the
/// maximum number of addresses.
pub fn is_limit_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains(LIMIT_REACHED_MESSAGE))
}

/// Whether a write was refused because the account already uses a Home or Work
/// address of that type.
pub fn is_type_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

const ADDRESS_COLUMNS: &str = "id, account_id, full_name, phone_number, alternate_phone, \
     pincode, state, city, street_address, address_type, country, is_default, \
     created_at, updated_at";

impl Address {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Address>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Default address first, then oldest first.
    pub async fn find_by_account_id(
        pool: &SqlitePool,
        account_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Address>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses
             WHERE account_id = $1
             ORDER BY is_default DESC, created_at ASC"
        ))
        .bind(account_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_by_account_id<'e, E>(
        executor: E,
        account_id: Uuid,
    ) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM addresses WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(executor)
            .await
    }

    /// Address types already used by an account, optionally ignoring one address.
    pub async fn used_types<'e, E>(
        executor: E,
        account_id: Uuid,
        excluding: Option<Uuid>,
    ) -> Result<Vec<AddressType>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows: Vec<(AddressType, Uuid)> =
            sqlx::query_as("SELECT address_type, id FROM addresses WHERE account_id = $1")
                .bind(account_id)
                .fetch_all(executor)
                .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, id)| Some(*id) != excluding)
            .map(|(address_type, _)| address_type)
            .collect())
    }

    pub async fn find_oldest_by_account_id(
        pool: &SqlitePool,
        account_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Address>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses
             WHERE account_id = $1
             ORDER BY created_at ASC
             LIMIT 1"
        ))
        .bind(account_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        account_id: Uuid,
        data: &CreateAddress,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query_as::<_, Address>(&format!(
            "INSERT INTO addresses (id, account_id, full_name, phone_number, alternate_phone,
                 pincode, state, city, street_address, address_type, country, is_default,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING {ADDRESS_COLUMNS}"
        ))
        .bind(id)
        .bind(account_id)
        .bind(&data.full_name)
        .bind(&data.phone_number)
        .bind(&data.alternate_phone)
        .bind(&data.pincode)
        .bind(&data.state)
        .bind(&data.city)
        .bind(&data.street_address)
        .bind(data.address_type)
        .bind(data.country)
        .bind(data.is_default)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
    }

    pub async fn update<'e, E>(
        executor: E,
        id: Uuid,
        data: &UpdateAddress,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Address>(&format!(
            "UPDATE addresses SET
                 full_name = $2, phone_number = $3, alternate_phone = $4, pincode = $5,
                 state = $6, city = $7, street_address = $8, address_type = $9,
                 country = $10, updated_at = $11
             WHERE id = $1
             RETURNING {ADDRESS_COLUMNS}"
        ))
        .bind(id)
        .bind(&data.full_name)
        .bind(&data.phone_number)
        .bind(&data.alternate_phone)
        .bind(&data.pincode)
        .bind(&data.state)
        .bind(&data.city)
        .bind(&data.street_address)
        .bind(data.address_type)
        .bind(data.country)
        .bind(Utc::now())
        .fetch_optional(executor)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM addresses WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn clear_default<'e, E>(executor: E, account_id: Uuid) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE addresses SET is_default = 0 WHERE account_id = $1 AND is_default = 1")
            .bind(account_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Make `id` the only default address of its account.
    pub async fn set_default(
        pool: &SqlitePool,
        account_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        Self::clear_default(&mut *tx, account_id).await?;

        let updated = sqlx::query_as::<_, Address>(&format!(
            "UPDATE addresses SET is_default = 1, updated_at = $3
             WHERE id = $1 AND account_id = $2
             RETURNING {ADDRESS_COLUMNS}"
        ))
        .bind(id)
        .bind(account_id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_some() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(updated)
    }
}
