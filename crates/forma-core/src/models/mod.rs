pub mod media;

pub use media::{
    DerivedFileKey, MediaRecord, ModelMetadata, ProcessingState, DEFAULT_DISPLAY_ORDER,
    PREVIEW_KEYS,
};
