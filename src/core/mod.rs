pub mod errors;
pub mod http;
pub mod logging;
pub mod models;
pub mod utils;

pub use errors::SyncError;
pub use models::{
    Card,
    CardId,
    Definition,
    DefinitionKind,
    FrequencyPair,
    RankValue,
    SyncStatus,
};
