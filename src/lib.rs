pub mod anki;
pub mod core;
pub mod dictionary;
pub mod persistence;
pub mod render;

pub use crate::{
    anki::{
        FieldMapping,
        SyncOrchestrator,
        SyncReport,
    },
    core::{
        Card,
        SyncError,
    },
};
