//! Parsing of ledger records from Redis storage
//!
//! Accounts are hashes of plain fields; entries, results, hands and receipts
//! are stored as JSON documents.

use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use shared::Credits;
use std::collections::HashMap;

use super::keys::account_key;
use crate::domain::Account;
use crate::errors::{AppError, Result};

fn field<'a>(map: &'a HashMap<String, String>, name: &str, account_id: &str) -> Result<&'a str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| AppError::PersistenceFailure(format!("account {} missing field {}", account_id, name)))
}

fn int_field(map: &HashMap<String, String>, name: &str, account_id: &str) -> Result<i64> {
    let raw = field(map, name, account_id)?;
    raw.parse::<i64>()
        .map_err(|_| AppError::PersistenceFailure(format!("account {} has invalid {}: {:?}", account_id, name, raw)))
}

fn timestamp(ms: i64, account_id: &str) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AppError::PersistenceFailure(format!("account {} has invalid timestamp {}", account_id, ms)))
}

/// Load an account from its Redis hash
///
/// Returns `Ok(None)` when the hash does not exist.
pub async fn load_account(redis: &mut ConnectionManager, account_id: &str) -> Result<Option<Account>> {
    let map: HashMap<String, String> = redis.hgetall(account_key(account_id)).await?;
    if map.is_empty() {
        return Ok(None);
    }
    parse_account(account_id, &map).map(Some)
}

pub fn parse_account(account_id: &str, map: &HashMap<String, String>) -> Result<Account> {
    Ok(Account {
        account_id: account_id.to_string(),
        balance: Credits::from_minor(int_field(map, "balance", account_id)?),
        initial_balance: Credits::from_minor(int_field(map, "initial_balance", account_id)?),
        version: int_field(map, "version", account_id)?,
        last_sequence: int_field(map, "last_sequence", account_id)?,
        created_at: timestamp(int_field(map, "created_at_ms", account_id)?, account_id)?,
        updated_at: timestamp(int_field(map, "updated_at_ms", account_id)?, account_id)?,
    })
}

/// Decode a list of JSON documents
pub fn parse_documents<T: DeserializeOwned>(raw: &[String]) -> Result<Vec<T>> {
    raw.iter()
        .map(|doc| serde_json::from_str(doc).map_err(AppError::from))
        .collect()
}
