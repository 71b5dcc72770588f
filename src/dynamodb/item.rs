use aws_sdk_dynamodb::types::AttributeValue;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::keys;

/// A single row of the course table.
///
/// Items are attribute maps keyed by name. Every row carries the composite
/// primary key (`PK`, `SK`); section and course-link rows additionally carry
/// the `GSI1PK`/`GSI1SK` index attributes.
///
/// # Example
///
/// ```
/// use course_store::dynamodb::Item;
///
/// let item = Item::key("COURSE#astro-12", "UNIT#1")
///     .set_string("title", "Stars")
///     .set_number("order", 1);
/// assert_eq!(item.sk(), Some("UNIT#1"));
/// ```
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Item {
    pub(crate) attributes: HashMap<String, AttributeValue>,
}

impl Item {
    /// Creates a new empty `Item`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an item holding only the primary key.
    pub fn key(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self::new().set_string(keys::PK, pk).set_string(keys::SK, sk)
    }

    /// Serializes a row struct into an item.
    pub fn from_serde<T: Serialize>(row: &T) -> Result<Self> {
        let attributes: HashMap<String, AttributeValue> = serde_dynamo::to_item(row)?;
        Ok(Self { attributes })
    }

    /// Deserializes the item into a row struct.
    pub fn to_serde<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_dynamo::from_item(self.attributes.clone())?)
    }

    /// Sets a string attribute.
    pub fn set_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(key.into(), AttributeValue::S(value.into()));
        self
    }

    /// Sets a number attribute.
    ///
    /// DynamoDB numbers travel as strings; whole values are written without a
    /// fractional part.
    pub fn set_number(mut self, key: impl Into<String>, value: impl Into<f64>) -> Self {
        self.attributes
            .insert(key.into(), AttributeValue::N(value.into().to_string()));
        self
    }

    /// Gets the value of an attribute as a string.
    pub fn get_string(&self, key: &str) -> Option<&String> {
        self.attributes.get(key).and_then(|av| av.as_s().ok())
    }

    /// Gets the value of an attribute as a number (f64).
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.attributes
            .get(key)
            .and_then(|av| av.as_n().ok())
            .and_then(|n| n.parse().ok())
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn pk(&self) -> Option<&str> {
        self.get_string(keys::PK).map(String::as_str)
    }

    pub fn sk(&self) -> Option<&str> {
        self.get_string(keys::SK).map(String::as_str)
    }

    /// The primary key of this item as a key-only item.
    pub fn primary_key(&self) -> Option<Item> {
        Some(Item::key(self.pk()?, self.sk()?))
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn into_attributes(self) -> HashMap<String, AttributeValue> {
        self.attributes
    }
}

impl From<HashMap<String, AttributeValue>> for Item {
    fn from(attributes: HashMap<String, AttributeValue>) -> Self {
        Self { attributes }
    }
}
