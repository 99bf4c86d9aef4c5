//! Prompt system for ragkit.
//!
//! This crate provides:
//! - Built-in prompt definitions for answer synthesis and the evaluation judges
//! - Workspace YAML overrides (`.ragkit/prompts/<id>.yml`)
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{builtin_prompt, load_prompt};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptDefinition, PromptInputSpec,
    PromptOutputSpec,
};
