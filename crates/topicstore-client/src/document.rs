//! Typed access to the stored JSON document

use crate::error::Result;
use crate::facade::{SaveStatus, StorageClient};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Entries grouped by category, the usual shape of a widget document
pub type EntryTree = BTreeMap<String, Vec<serde_json::Value>>;

/// Load the document and decode it as `T`
///
/// # Errors
/// Storage failures, or `ClientError::Document` if the stored JSON does not
/// decode as `T`.
pub async fn load_document<T, S>(storage: &S) -> Result<T>
where
    T: DeserializeOwned,
    S: StorageClient + ?Sized,
{
    storage.load_data().await?;
    Ok(serde_json::from_str(&storage.get_data())?)
}

/// Encode `document` and store it
///
/// # Errors
/// Storage failures, or `ClientError::Document` if encoding fails.
pub async fn save_document<T, S>(storage: &S, document: &T) -> Result<SaveStatus>
where
    T: Serialize + ?Sized,
    S: StorageClient + ?Sized,
{
    let data = serde_json::to_string(document)?;
    storage.save_data(&data).await
}
