use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::access::{AccessError, ObjectHandle, ObjectPropertyAccess};
use crate::value::{PropertyKind, PropertyValue};

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document text is empty")]
    EmptyInput,
    #[error("parse document json at {path}: {message}")]
    Parse { path: String, message: String },
    #[error("document version {found} is newer than supported {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("encode document json: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("document key cannot be empty")]
    EmptyKey,
    #[error("no stored value for '{object_key}.{property}'")]
    NotFound {
        object_key: String,
        property: String,
    },
    #[error("stored text '{text}' for '{object_key}.{property}' is not a {kind:?}")]
    Unparsable {
        object_key: String,
        property: String,
        kind: PropertyKind,
        text: String,
    },
    #[error(transparent)]
    Access(#[from] AccessError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub definition: String,
    pub save_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum CustomEntry {
    Text(String),
    List(Vec<String>),
}

/// Type-erased persistent store: object key -> property name -> text, plus
/// a flat namespace of scalar strings and ordered string arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyDocument {
    version: u32,
    properties: BTreeMap<String, BTreeMap<String, String>>,
    functions: BTreeMap<String, Vec<String>>,
    favorites: Vec<FavoriteEntry>,
    custom: BTreeMap<String, CustomEntry>,
}

impl Default for PropertyDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            properties: BTreeMap::new(),
            functions: BTreeMap::new(),
            favorites: Vec::new(),
            custom: BTreeMap::new(),
        }
    }
}

impl PropertyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn set_property(&mut self, object_key: &str, property: &str, value: &PropertyValue) -> bool {
        self.set_property_text(object_key, property, value.to_text())
    }

    pub fn set_property_text(
        &mut self,
        object_key: &str,
        property: &str,
        text: impl Into<String>,
    ) -> bool {
        if !keys_present("set_property", object_key, property) {
            return false;
        }
        let text = text.into();
        trace!(object_key, property, text = text.as_str(), "document_property_set");
        self.properties
            .entry(object_key.to_string())
            .or_default()
            .insert(property.to_string(), text);
        true
    }

    pub fn remove_property(&mut self, object_key: &str, property: &str) -> bool {
        if !keys_present("remove_property", object_key, property) {
            return false;
        }
        let Some(object) = self.properties.get_mut(object_key) else {
            warn!(object_key, "document_object_key_missing");
            return false;
        };
        if object.remove(property).is_none() {
            warn!(object_key, property, "document_property_missing");
            return false;
        }
        if object.is_empty() {
            self.properties.remove(object_key);
        }
        true
    }

    pub fn get_property(&self, object_key: &str, property: &str) -> Option<&str> {
        self.properties
            .get(object_key)
            .and_then(|object| object.get(property))
            .map(String::as_str)
    }

    /// Reads a stored property as `kind`; `None` when absent or not parseable
    /// as that kind.
    pub fn get_property_as(
        &self,
        object_key: &str,
        property: &str,
        kind: PropertyKind,
    ) -> Option<PropertyValue> {
        PropertyValue::parse_as(kind, self.get_property(object_key, property)?)
    }

    pub fn property_names(&self, object_key: &str) -> impl Iterator<Item = &str> {
        self.properties
            .get(object_key)
            .into_iter()
            .flat_map(|object| object.keys().map(String::as_str))
    }

    pub fn set_string_array(&mut self, key: &str, values: &[String]) -> bool {
        if key.is_empty() {
            warn!("document_array_key_empty");
            return false;
        }
        self.custom
            .insert(key.to_string(), CustomEntry::List(values.to_vec()));
        true
    }

    /// Stored order; empty when absent or when `key` holds a scalar.
    pub fn get_string_array(&self, key: &str) -> Vec<String> {
        match self.custom.get(key) {
            Some(CustomEntry::List(values)) => values.clone(),
            Some(CustomEntry::Text(_)) => {
                warn!(key, "document_key_is_not_an_array");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    pub fn set_scalar_string(&mut self, key: &str, value: impl Into<String>) -> bool {
        if key.is_empty() {
            warn!("document_scalar_key_empty");
            return false;
        }
        self.custom
            .insert(key.to_string(), CustomEntry::Text(value.into()));
        true
    }

    pub fn get_scalar_string(&self, key: &str, default: &str) -> String {
        match self.custom.get(key) {
            Some(CustomEntry::Text(value)) => value.clone(),
            _ => default.to_string(),
        }
    }

    pub fn has_scalar_string(&self, key: &str) -> bool {
        matches!(self.custom.get(key), Some(CustomEntry::Text(_)))
    }

    pub fn add_function(&mut self, object_key: &str, function: &str) -> bool {
        if !keys_present("add_function", object_key, function) {
            return false;
        }
        let functions = self.functions.entry(object_key.to_string()).or_default();
        if functions.iter().any(|existing| existing == function) {
            return false;
        }
        functions.push(function.to_string());
        true
    }

    pub fn remove_function(&mut self, object_key: &str, function: &str) -> bool {
        let Some(functions) = self.functions.get_mut(object_key) else {
            return false;
        };
        let before = functions.len();
        functions.retain(|existing| existing != function);
        let removed = functions.len() != before;
        if functions.is_empty() {
            self.functions.remove(object_key);
        }
        removed
    }

    pub fn has_function(&self, object_key: &str, function: &str) -> bool {
        self.functions
            .get(object_key)
            .is_some_and(|functions| functions.iter().any(|existing| existing == function))
    }

    pub fn add_favorite(&mut self, definition: &str, save_key: &str) -> bool {
        if definition.is_empty() {
            warn!("document_favorite_definition_empty");
            return false;
        }
        if self.has_favorite(definition, save_key) {
            return false;
        }
        self.favorites.push(FavoriteEntry {
            definition: definition.to_string(),
            save_key: save_key.to_string(),
        });
        true
    }

    pub fn remove_favorite(&mut self, definition: &str, save_key: &str) -> bool {
        let before = self.favorites.len();
        self.favorites
            .retain(|entry| !(entry.definition == definition && entry.save_key == save_key));
        self.favorites.len() != before
    }

    pub fn has_favorite(&self, definition: &str, save_key: &str) -> bool {
        self.favorites
            .iter()
            .any(|entry| entry.definition == definition && entry.save_key == save_key)
    }

    pub fn favorites(&self) -> &[FavoriteEntry] {
        &self.favorites
    }

    pub fn serialize(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Replaces the whole document with the parsed text. On any error the
    /// current contents are left untouched.
    pub fn deserialize(&mut self, text: &str) -> Result<(), DocumentError> {
        let parsed = Self::parse(text)?;
        *self = parsed;
        debug!(
            objects = self.properties.len(),
            custom = self.custom.len(),
            "document_deserialized"
        );
        Ok(())
    }

    /// Stores the live value of `handle.property` under `object_key`.
    pub fn capture_property(
        &mut self,
        object_key: &str,
        access: &dyn ObjectPropertyAccess,
        handle: ObjectHandle,
        property: &str,
    ) -> Result<(), DocumentError> {
        if object_key.is_empty() || property.is_empty() {
            warn!(object = %handle, "document_capture_key_empty");
            return Err(DocumentError::EmptyKey);
        }
        let value = access.read_property(handle, property)?;
        self.set_property(object_key, property, &value);
        Ok(())
    }

    /// Parses the stored text as the live property's current kind and writes
    /// it back. Returns the applied value.
    pub fn apply_to_object(
        &self,
        object_key: &str,
        access: &dyn ObjectPropertyAccess,
        handle: ObjectHandle,
        property: &str,
    ) -> Result<PropertyValue, DocumentError> {
        if object_key.is_empty() || property.is_empty() {
            warn!(object = %handle, "document_apply_key_empty");
            return Err(DocumentError::EmptyKey);
        }
        let text = self
            .get_property(object_key, property)
            .ok_or_else(|| DocumentError::NotFound {
                object_key: object_key.to_string(),
                property: property.to_string(),
            })?;
        let kind = access.read_property(handle, property)?.kind();
        let value = PropertyValue::parse_as(kind, text).ok_or_else(|| DocumentError::Unparsable {
            object_key: object_key.to_string(),
            property: property.to_string(),
            kind,
            text: text.to_string(),
        })?;
        access.write_property(handle, property, value.clone())?;
        debug!(object = %handle, object_key, property, value = %value, "document_value_applied");
        Ok(value)
    }

    fn parse(text: &str) -> Result<Self, DocumentError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(DocumentError::EmptyInput);
        }

        let mut deserializer = serde_json::Deserializer::from_str(trimmed);
        let parsed: Self = serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            DocumentError::Parse {
                path,
                message: error.into_inner().to_string(),
            }
        })?;
        deserializer.end().map_err(|error| DocumentError::Parse {
            path: ".".to_string(),
            message: error.to_string(),
        })?;

        if parsed.version > DOCUMENT_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                found: parsed.version,
                supported: DOCUMENT_VERSION,
            });
        }
        Ok(parsed)
    }
}

fn keys_present(operation: &'static str, object_key: &str, name: &str) -> bool {
    if object_key.is_empty() || name.is_empty() {
        warn!(operation, object_key, name, "document_key_empty");
        return false;
    }
    true
}
