pub mod consent;
pub mod handle;
pub mod template;
pub mod version;

pub use consent::{Consent, ConsentStatus, PreferenceChoice, PreferenceStatus};
pub use handle::{ConsentHandle, HandleStatus};
pub use template::{ConsentTemplate, LocalizedContent, PreferenceDefinition, TemplateStatus};
pub use version::{VersionMeta, VersionStatus, Versioned};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::database::{Document, StorageError};
use crate::error::{CoreError, CoreResult};

/// Serialize a model into a store document
pub fn to_document<T: Serialize>(value: &T) -> CoreResult<Document> {
    match serde_json::to_value(value).map_err(StorageError::from)? {
        Value::Object(document) => Ok(document),
        _ => Err(CoreError::invalid_input("Model did not serialize to an object")),
    }
}

pub fn from_document<T: DeserializeOwned>(document: Document) -> CoreResult<T> {
    Ok(serde_json::from_value(Value::Object(document)).map_err(StorageError::from)?)
}
