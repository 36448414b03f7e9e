//! Wire types for the bundle REST API.
//!
//! These mirror the JSON the backend actually sends. Nothing here decides
//! what to do with a response; that lives in `bundlesync-core`.

pub mod contents;
pub mod endpoints;
pub mod jsonapi;
pub mod state;

pub use contents::ContentsEntry;
pub use contents::ContentsInfo;
pub use contents::ContentsInfoEnvelope;
pub use contents::TargetKind;
pub use jsonapi::JsonApiDocument;
pub use jsonapi::Linkage;
pub use jsonapi::Relationship;
pub use jsonapi::Resource;
pub use jsonapi::ResourceIdentifier;
pub use state::BundleState;
