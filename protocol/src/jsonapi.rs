//! JSON:API document shapes returned by `/rest/bundles/{id}`.
//!
//! A document encodes every entity once (the primary `data` plus the
//! `included` array) and expresses relationships as `(type, id)` pointers.
//! Resolving those pointers is the consumer's job.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonApiDocument {
    #[serde(default)]
    pub data: Option<PrimaryData>,
    #[serde(default)]
    pub included: Vec<Resource>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl JsonApiDocument {
    /// The single primary resource, if the document carries exactly one.
    pub fn primary(&self) -> Option<&Resource> {
        match &self.data {
            Some(PrimaryData::One(resource)) => Some(resource),
            Some(PrimaryData::Many(resources)) if resources.len() == 1 => resources.first(),
            _ => None,
        }
    }

    /// Every resource in the document: primary data first, then `included`.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        let primary: &[Resource] = match &self.data {
            Some(PrimaryData::One(resource)) => std::slice::from_ref(resource),
            Some(PrimaryData::Many(resources)) => resources,
            None => &[],
        };
        primary.iter().chain(self.included.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Resource),
    Many(Vec<Resource>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Relationship>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Resource {
    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier {
            kind: self.kind.clone(),
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Relationship {
    /// `None` both when the member is absent and when it is an explicit `null`.
    #[serde(default)]
    pub data: Option<Linkage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    One(ResourceIdentifier),
    Many(Vec<ResourceIdentifier>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

/// Some backends emit integer ids for join-table resources; treat them as strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
