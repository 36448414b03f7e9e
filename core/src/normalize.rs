//! Metadata normalization.
//!
//! Turns the relational JSON:API bundle document into a [`BundleMetadataView`]
//! with every relationship resolved into an embedded [`Entity`]. A view is
//! built whole from one response and never patched afterwards.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use bundlesync_protocol::BundleState;
use bundlesync_protocol::JsonApiDocument;
use bundlesync_protocol::Linkage;
use bundlesync_protocol::Resource;
use bundlesync_protocol::ResourceIdentifier;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::classifier::StateClass;
use crate::classifier::classify_state;

/// `bundle_type` value the backend uses for bundles the caller may not inspect.
pub const PRIVATE_BUNDLE_TYPE: &str = "private";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    /// Detail must not be shown; the presentation layer renders a notice.
    Private,
}

/// A resolved JSON:API resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub kind: String,
    pub id: String,
    pub attributes: Map<String, Value>,
    pub relationships: BTreeMap<String, Related>,
}

impl Entity {
    /// Placeholder for a pointer whose target is not in the document.
    fn stub(identifier: &ResourceIdentifier) -> Self {
        Self {
            kind: identifier.kind.clone(),
            id: identifier.id.clone(),
            attributes: Map::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// True when only `(kind, id)` is known.
    pub fn is_stub(&self) -> bool {
        self.attributes.is_empty() && self.relationships.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    One(Option<Box<Entity>>),
    Many(Vec<Entity>),
}

impl Related {
    pub fn one(&self) -> Option<&Entity> {
        match self {
            Self::One(entity) => entity.as_deref(),
            Self::Many(entities) => entities.first(),
        }
    }

    pub fn many(&self) -> Vec<&Entity> {
        match self {
            Self::One(entity) => entity.as_deref().into_iter().collect(),
            Self::Many(entities) => entities.iter().collect(),
        }
    }
}

/// Flat view of one bundle's metadata response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleMetadataView {
    pub id: String,
    /// `None` when the backend withholds the state (private bundles).
    pub state: Option<BundleState>,
    pub bundle_type: String,
    pub visibility: Visibility,
    pub attributes: Map<String, Value>,
    pub owner: Option<Entity>,
    pub group_permissions: Vec<Entity>,
    pub host_worksheets: Vec<Entity>,
    /// Metadata keys the caller may edit, from `meta.editable_metadata_keys`.
    pub editable_metadata_fields: Vec<String>,
    /// Type discriminator for the metadata fields, from `meta.metadata_type`.
    pub metadata_type: Value,
}

impl BundleMetadataView {
    /// Classification driving the polling cadence. An unknown or withheld
    /// state keeps polling.
    pub fn state_class(&self) -> StateClass {
        self.state
            .as_ref()
            .map(classify_state)
            .unwrap_or(StateClass::Transient)
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// User-facing metadata block (`attributes.metadata`).
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.attributes.get("metadata").and_then(Value::as_object)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("document has no single primary resource")]
    MissingPrimary,

    #[error("primary resource is {0:?}, expected bundles")]
    UnexpectedKind(String),
}

/// Resolve a bundle document into a metadata view.
pub fn normalize_bundle(doc: &JsonApiDocument) -> Result<BundleMetadataView, NormalizeError> {
    let primary = doc.primary().ok_or(NormalizeError::MissingPrimary)?;
    if primary.kind != "bundles" {
        return Err(NormalizeError::UnexpectedKind(primary.kind.clone()));
    }

    let entity = Resolver::new(doc).resolve(primary);
    let meta = if primary.meta.is_empty() {
        &doc.meta
    } else {
        &primary.meta
    };

    let bundle_type = entity
        .attribute_str("bundle_type")
        .unwrap_or_default()
        .to_string();
    let visibility = if bundle_type == PRIVATE_BUNDLE_TYPE {
        Visibility::Private
    } else {
        Visibility::Visible
    };
    let state = entity.attribute_str("state").map(BundleState::from);

    let mut relationships = entity.relationships;
    let owner = relationships
        .remove("owner")
        .and_then(|related| related.one().cloned());
    let group_permissions = take_many(&mut relationships, "group_permissions");
    let host_worksheets = take_many(&mut relationships, "host_worksheets");

    Ok(BundleMetadataView {
        id: entity.id,
        state,
        bundle_type,
        visibility,
        attributes: entity.attributes,
        owner,
        group_permissions,
        host_worksheets,
        editable_metadata_fields: string_list(meta.get("editable_metadata_keys")),
        metadata_type: meta.get("metadata_type").cloned().unwrap_or(Value::Null),
    })
}

fn take_many(relationships: &mut BTreeMap<String, Related>, name: &str) -> Vec<Entity> {
    match relationships.remove(name) {
        Some(Related::Many(entities)) => entities,
        Some(Related::One(entity)) => entity.map(|e| *e).into_iter().collect(),
        None => Vec::new(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Walks relationship pointers through the document's resource index.
struct Resolver<'a> {
    index: HashMap<ResourceIdentifier, &'a Resource>,
}

impl<'a> Resolver<'a> {
    fn new(doc: &'a JsonApiDocument) -> Self {
        let mut index = HashMap::new();
        for resource in doc.resources() {
            // First occurrence wins; primary data precedes `included`.
            index.entry(resource.identifier()).or_insert(resource);
        }
        Self { index }
    }

    fn resolve(&self, resource: &Resource) -> Entity {
        let mut path = HashSet::new();
        self.resolve_on_path(resource, &mut path)
    }

    /// `path` holds the resources currently being expanded. A pointer back to
    /// one of them becomes a stub so cyclic documents terminate.
    fn resolve_on_path(
        &self,
        resource: &Resource,
        path: &mut HashSet<ResourceIdentifier>,
    ) -> Entity {
        let identifier = resource.identifier();
        path.insert(identifier.clone());

        let relationships = resource
            .relationships
            .iter()
            .map(|(name, relationship)| {
                let related = match &relationship.data {
                    None => Related::One(None),
                    Some(Linkage::One(target)) => {
                        Related::One(Some(Box::new(self.lookup(target, path))))
                    }
                    Some(Linkage::Many(targets)) => Related::Many(
                        targets
                            .iter()
                            .map(|target| self.lookup(target, path))
                            .collect(),
                    ),
                };
                (name.clone(), related)
            })
            .collect();

        path.remove(&identifier);

        Entity {
            kind: resource.kind.clone(),
            id: resource.id.clone(),
            attributes: resource.attributes.clone(),
            relationships,
        }
    }

    fn lookup(&self, target: &ResourceIdentifier, path: &mut HashSet<ResourceIdentifier>) -> Entity {
        match self.index.get(target) {
            Some(resource) if !path.contains(target) => self.resolve_on_path(resource, path),
            _ => Entity::stub(target),
        }
    }
}
