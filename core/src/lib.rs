//! Root of the `bundlesync-core` library.
//!
//! Keeps a client-side view of one remote bundle fresh while it executes:
//! metadata and contents are polled on independent loops until the bundle
//! reaches a terminal state, and every change is published as an immutable
//! [`BundleSnapshot`].

// Output goes through tracing or the observer, never straight to a terminal.
#![deny(clippy::print_stdout, clippy::print_stderr)]

mod backend;
pub mod classifier;
pub mod config;
pub mod content;
pub mod engine;
pub mod errors;
pub mod guard;
mod identity;
pub mod normalize;
pub mod scheduler;
pub mod snapshot;

pub use backend::BundleBackend;
pub use classifier::StateClass;
pub use classifier::classify;
pub use classifier::classify_state;
pub use config::SummaryErrorPolicy;
pub use config::SyncConfig;
pub use content::ContentSummary;
pub use content::SummaryTarget;
pub use engine::EngineHandle;
pub use engine::EngineStopped;
pub use engine::NoopObserver;
pub use engine::SyncEngine;
pub use engine::SyncObserver;
pub use errors::BackendError;
pub use errors::ErrorKind;
pub use errors::ErrorLog;
pub use errors::ErrorRecord;
pub use errors::SyncError;
pub use guard::FetchKind;
pub use identity::BundleId;
pub use identity::Generation;
pub use normalize::BundleMetadataView;
pub use normalize::Visibility;
pub use normalize::normalize_bundle;
pub use snapshot::BundleSnapshot;
pub use snapshot::ViewState;

pub use bundlesync_protocol as protocol;
pub use bundlesync_protocol::BundleState;
