pub mod api;

pub mod fields;

pub mod media;

pub mod sync;

pub mod types;

pub use api::AnkiConnectClient;
pub use fields::build_fields;
pub use media::{
    build_plan,
    MediaPlan,
    MediaUpload,
};
pub use sync::{
    AssetFetcher,
    BaseUrlAssetFetcher,
    CardOutcome,
    CardResult,
    FailureKind,
    FailureReason,
    NoteTransport,
    SkipReason,
    SyncOrchestrator,
    SyncPersistence,
    SyncReport,
};
pub use types::{
    BuiltFields,
    FieldMapping,
    Marker,
};

#[cfg(test)]
mod sync_tests;
