use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use super::{DefinitionError, CREATED_AT, UPDATED_AT};
use crate::crypto::Sealer;

/// One entry of a user-submitted schema, stored as-is in the platform database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl FieldDefinition {
    /// Copy safe to return to clients
    pub fn redacted(&self) -> Self {
        Self {
            secret_key: self.secret_key.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Array,
    Object,
    Mixed,
}

impl FieldType {
    /// Case-insensitive lookup; `None` for unknown names
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "string" => FieldType::String,
            "number" => FieldType::Number,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "objectid" => FieldType::ObjectId,
            "array" => FieldType::Array,
            "object" => FieldType::Object,
            "mixed" => FieldType::Mixed,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::ObjectId => "objectid",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Mixed => "mixed",
        }
    }
}

/// A field ready for validation: type resolved, pattern compiled, secret opened
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub unique: bool,
    pub pattern: Option<Regex>,
    pub message: Option<String>,
    pub enum_values: Vec<Value>,
    pub secure: bool,
    pub secret_key: Option<String>,
    pub reference: Option<String>,
}

/// Compiled form of a stored schema. Field order follows the definition.
#[derive(Debug, Clone)]
pub struct DynamicSchema {
    pub name: String,
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

impl DynamicSchema {
    /// Build from stored definitions. Incomplete entries are skipped, unknown
    /// types become strings and a repeated name replaces the earlier entry.
    /// Only string fields may be secure. Secret keys must already be opened.
    pub fn from_definitions(name: &str, definitions: &[FieldDefinition]) -> Result<Self, DefinitionError> {
        let mut fields: Vec<FieldSpec> = Vec::with_capacity(definitions.len());
        let mut index: HashMap<String, usize> = HashMap::new();

        for def in definitions {
            let field_name = def.name.trim();
            if field_name.is_empty() || def.field_type.trim().is_empty() {
                warn!("Skipping invalid field in schema '{}': {:?}", name, def);
                continue;
            }
            check_field_name(field_name)?;

            let field_type = FieldType::parse(&def.field_type).unwrap_or_else(|| {
                warn!(
                    "Invalid type '{}' for field '{}'. Using 'string' instead.",
                    def.field_type, field_name
                );
                FieldType::String
            });
            if def.secure && field_type != FieldType::String {
                return Err(DefinitionError::SecureType(field_name.to_string()));
            }

            let pattern = match def.pattern.as_deref().filter(|p| !p.is_empty()) {
                Some(p) => Some(Regex::new(p).map_err(|e| DefinitionError::InvalidPattern {
                    field: field_name.to_string(),
                    reason: e.to_string(),
                })?),
                None => None,
            };

            let spec = FieldSpec {
                name: field_name.to_string(),
                field_type,
                required: def.required,
                unique: def.unique,
                pattern,
                message: def.message.clone().filter(|m| !m.is_empty()),
                enum_values: def.enum_values.clone(),
                secure: def.secure,
                secret_key: def.secret_key.clone().filter(|k| !k.is_empty()),
                reference: if field_type == FieldType::ObjectId {
                    def.reference.clone().filter(|r| !r.is_empty())
                } else {
                    None
                },
            };

            match index.get(field_name) {
                Some(&pos) => {
                    warn!("Field '{}' defined twice in schema '{}'; keeping the last", field_name, name);
                    fields[pos] = spec;
                }
                None => {
                    index.insert(field_name.to_string(), fields.len());
                    fields.push(spec);
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            fields,
            index,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Type of a queryable path; timestamps and `_id` are implicit
    pub fn type_of(&self, path: &str) -> Option<FieldType> {
        match path {
            "_id" => Some(FieldType::ObjectId),
            CREATED_AT | UPDATED_AT => Some(FieldType::Date),
            _ => self.field(path).map(|f| f.field_type),
        }
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.unique)
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.reference.is_some())
    }
}

fn check_field_name(name: &str) -> Result<(), DefinitionError> {
    if name == "_id" || name == CREATED_AT || name == UPDATED_AT || name.starts_with('$') || name.contains('.') {
        return Err(DefinitionError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Strict check applied when a schema is created or updated
pub fn validate_definitions(definitions: &[FieldDefinition]) -> Result<(), DefinitionError> {
    if definitions.is_empty() {
        return Err(DefinitionError::Empty);
    }

    let mut seen = std::collections::HashSet::new();
    for (position, def) in definitions.iter().enumerate() {
        let name = def.name.trim();
        if name.is_empty() || def.field_type.trim().is_empty() {
            return Err(DefinitionError::Incomplete(position));
        }
        check_field_name(name)?;
        if !seen.insert(name) {
            return Err(DefinitionError::Duplicate(name.to_string()));
        }
        if let Some(target) = def.reference.as_deref() {
            if FieldType::parse(&def.field_type) != Some(FieldType::ObjectId) || validate_collection_name(target).is_err() {
                return Err(DefinitionError::InvalidRef(name.to_string()));
            }
        }
    }

    // Compiles patterns and applies the lenient rules on top
    DynamicSchema::from_definitions("validation", definitions).map(|_| ())
}

/// Seal plaintext secret keys before a definition is stored
pub fn seal_secret_keys(definitions: &mut [FieldDefinition], sealer: &Sealer) -> Result<(), crate::crypto::CryptoError> {
    for def in definitions.iter_mut() {
        if let Some(key) = def.secret_key.as_ref().filter(|k| !k.is_empty()) {
            def.secret_key = Some(sealer.seal(key)?);
        }
    }
    Ok(())
}

/// Open stored secret keys so the schema can seal field values
pub fn open_secret_keys(definitions: &[FieldDefinition], sealer: &Sealer) -> Result<Vec<FieldDefinition>, DefinitionError> {
    definitions
        .iter()
        .map(|def| {
            let mut def = def.clone();
            if let Some(sealed) = def.secret_key.as_ref().filter(|k| !k.is_empty()) {
                let opened = sealer
                    .open(sealed)
                    .map_err(|_| DefinitionError::SecretKey(def.name.clone()))?;
                def.secret_key = Some(opened);
            }
            Ok(def)
        })
        .collect()
}

pub fn validate_collection_name(name: &str) -> Result<(), DefinitionError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DefinitionError::InvalidCollectionName(name.to_string()))
    }
}
