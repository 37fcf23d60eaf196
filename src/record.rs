use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::schema::ModelSchema;
use crate::value::Value;

/// Ordered tuple of identifier values that names a record within its model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(Vec<Value>);

impl NaturalKey {
    pub fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("__")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl From<&str> for NaturalKey {
    fn from(s: &str) -> Self {
        Self(vec![Value::from(s)])
    }
}

/// Identifier assigned to a record by the destination system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RemoteId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<uuid::Uuid> for RemoteId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One synchronizable entity.
///
/// Children are owned: a photo lives inside the product it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    model: String,
    key: NaturalKey,
    identifiers: BTreeMap<String, Value>,
    attributes: BTreeMap<String, Value>,
    children: Vec<Record>,
    ignore: bool,
    remote_id: Option<RemoteId>,
}

impl Record {
    pub fn builder(model: &ModelSchema) -> RecordBuilder<'_> {
        RecordBuilder::new(model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn key(&self) -> &NaturalKey {
        &self.key
    }

    pub fn identifiers(&self) -> &BTreeMap<String, Value> {
        &self.identifiers
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn children(&self) -> &[Record] {
        &self.children
    }

    pub fn is_ignored(&self) -> bool {
        self.ignore
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    pub fn set_ignore(&mut self, ignore: bool) {
        self.ignore = ignore;
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Record> {
        &mut self.children
    }
}

/// Typed construction path for [`Record`]s.
///
/// Only identifier fields and attributes declared on the model are accepted, so
/// loosely-typed rows have to be mapped field by field at the adapter boundary.
#[derive(Debug)]
pub struct RecordBuilder<'a> {
    model: &'a ModelSchema,
    identifiers: BTreeMap<String, Value>,
    attributes: BTreeMap<String, Value>,
    unknown: Option<String>,
    children: Vec<Record>,
    ignore: bool,
    remote_id: Option<RemoteId>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(model: &'a ModelSchema) -> Self {
        Self {
            model,
            identifiers: BTreeMap::new(),
            attributes: BTreeMap::new(),
            unknown: None,
            children: Vec::new(),
            ignore: false,
            remote_id: None,
        }
    }

    /// Sets a field. Identifier fields feed the natural key; everything else
    /// must be a declared attribute.
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        if self.model.identifiers.iter().any(|i| i == name) {
            self.identifiers.insert(name.to_string(), value.into());
        } else if self.model.declares_attribute(name) {
            self.attributes.insert(name.to_string(), value.into());
        } else if self.unknown.is_none() {
            self.unknown = Some(name.to_string());
        }
        self
    }

    pub fn child(mut self, child: Record) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Record>) -> Self {
        self.children.extend(children);
        self
    }

    /// Marks the record as reference-only.
    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn remote_id(mut self, id: impl Into<RemoteId>) -> Self {
        self.remote_id = Some(id.into());
        self
    }

    pub fn build(self) -> Result<Record, RecordError> {
        if let Some(attribute) = self.unknown {
            return Err(RecordError::UnknownAttribute {
                model: self.model.name.clone(),
                attribute,
            });
        }
        let key = self.model.key_of(&self.identifiers)?;
        Ok(Record {
            model: self.model.name.clone(),
            key,
            identifiers: self.identifiers,
            attributes: self.attributes,
            children: self.children,
            ignore: self.ignore,
            remote_id: self.remote_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IdentityError;

    fn product() -> ModelSchema {
        ModelSchema::new("product", &["productnumber"]).with_attributes(&["name", "price"])
    }

    #[test]
    fn builds_record_with_key_and_attributes() {
        let model = product();
        let record = Record::builder(&model)
            .field("productnumber", "A-100")
            .field("name", "Work jacket")
            .field("price", 10.0)
            .remote_id(42_i64)
            .build()
            .unwrap();

        assert_eq!(record.key(), &NaturalKey::from("A-100"));
        assert_eq!(record.attribute("price"), Some(&Value::from(10.0)));
        assert_eq!(record.remote_id(), Some(&RemoteId::from(42_i64)));
        assert!(!record.is_ignored());
    }

    #[test]
    fn rejects_undeclared_attribute() {
        let model = product();
        let err = Record::builder(&model)
            .field("productnumber", "A-100")
            .field("colour", "red")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RecordError::UnknownAttribute {
                model: "product".into(),
                attribute: "colour".into()
            }
        );
    }

    #[test]
    fn rejects_missing_identity() {
        let model = product();
        let err = Record::builder(&model).field("name", "x").build().unwrap_err();
        assert!(matches!(
            err,
            RecordError::Identity(IdentityError::MissingField { .. })
        ));
    }
}
