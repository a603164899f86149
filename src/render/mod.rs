pub mod content;
pub mod html;
pub mod placeholder;

pub use html::{
    render_definitions,
    MediaKind,
    MediaReference,
    RenderOptions,
    Rendered,
};
pub use placeholder::{
    namespace_hash,
    PlaceholderRegistry,
    RenderScope,
};
