pub mod frequency;

pub use frequency::{
    extract_ranks,
    format_list,
    harmonic_rank,
    UNRANKED,
};
