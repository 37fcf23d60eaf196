//! Model declarations: which record types exist, how they are keyed, which
//! attributes are compared, and which model owns which.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, SchemaError};
use crate::record::NaturalKey;
use crate::value::Value;

/// Declaration of a single record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    /// Identifier fields, in key order.
    pub identifiers: Vec<String>,
    /// Attributes compared by the diff.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Model whose records own records of this model.
    #[serde(default)]
    pub parent: Option<String>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>, identifiers: &[&str]) -> Self {
        Self {
            name: name.into(),
            identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
            attributes: Vec::new(),
            parent: None,
        }
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn declares_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// Builds the natural key from the identifier fields, in declaration order.
    pub fn key_of(&self, fields: &BTreeMap<String, Value>) -> Result<NaturalKey, IdentityError> {
        let mut parts = Vec::with_capacity(self.identifiers.len());
        for field in &self.identifiers {
            let value = fields.get(field).ok_or_else(|| IdentityError::MissingField {
                model: self.name.clone(),
                field: field.clone(),
            })?;
            if !value.is_scalar() {
                return Err(IdentityError::NotScalar {
                    model: self.name.clone(),
                    field: field.clone(),
                });
            }
            if value.is_empty() {
                return Err(IdentityError::EmptyField {
                    model: self.name.clone(),
                    field: field.clone(),
                });
            }
            parts.push(value.clone());
        }
        Ok(NaturalKey::new(parts))
    }
}

/// A validated set of models, kept in dependency order (parents first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    models: Vec<ModelSchema>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(models: Vec<ModelSchema>) -> Result<Self, SchemaError> {
        let mut declared: HashMap<&str, &ModelSchema> = HashMap::new();
        for model in &models {
            if declared.insert(model.name.as_str(), model).is_some() {
                return Err(SchemaError::DuplicateModel(model.name.clone()));
            }
            if model.identifiers.is_empty() {
                return Err(SchemaError::NoIdentifiers(model.name.clone()));
            }
            let identifiers: HashSet<&String> = model.identifiers.iter().collect();
            if let Some(field) = model.attributes.iter().find(|a| identifiers.contains(a)) {
                return Err(SchemaError::OverlappingField {
                    model: model.name.clone(),
                    field: field.clone(),
                });
            }
        }

        // Depth of every model in the ownership forest; a chain longer than the
        // number of models can only be a cycle.
        let mut depths = Vec::with_capacity(models.len());
        for model in &models {
            let mut depth = 0usize;
            let mut current = model;
            while let Some(parent) = &current.parent {
                let child = current;
                current = declared.get(parent.as_str()).ok_or_else(|| {
                    SchemaError::UnknownParent {
                        model: child.name.clone(),
                        parent: parent.clone(),
                    }
                })?;
                depth += 1;
                if depth > models.len() {
                    return Err(SchemaError::Cycle(model.name.clone()));
                }
            }
            depths.push(depth);
        }

        let mut ordered: Vec<(usize, usize, ModelSchema)> = models
            .into_iter()
            .enumerate()
            .map(|(position, model)| (depths[position], position, model))
            .collect();
        ordered.sort_by_key(|(depth, position, _)| (*depth, *position));

        let models: Vec<ModelSchema> = ordered.into_iter().map(|(_, _, m)| m).collect();
        let index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        Ok(Self { models, index })
    }

    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.index.get(name).map(|&i| &self.models[i])
    }

    /// Models with parents before their children.
    pub fn models(&self) -> &[ModelSchema] {
        &self.models
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}
