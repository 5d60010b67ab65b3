pub mod cache;
pub mod clients;
pub mod config;
pub mod consolidate;
pub mod dedup;
pub mod details;
pub mod error;
pub mod fallback;
pub mod mapping;
pub mod model;
pub mod pipeline;
pub mod source;
pub mod taxonomy;
pub mod validation;

pub use config::Config;
pub use error::{Result, UnifyError};
pub use model::{
    Category, CategoryId, ConsolidationResult, Framework, FrameworkId, FrameworkSelection,
    RawRequirement, UnifiedCategoryContent,
};
pub use pipeline::{CategoryOutcome, Engine, Generation};
