//! Prompt engine for Promptly.
//!
//! This crate provides the template/persona model and the pure parts of
//! the engine:
//! - Entity types (personas, versioned templates, rendered prompts, profiles)
//! - `{{variable}}` extraction
//! - Template composition from a persona and task/guideline text
//! - Literal, single-pass variable substitution

pub mod builder;
pub mod types;
pub mod variables;

// Re-export main types
pub use builder::{build_body, build_meta_role, compose_template, render, RenderedPrompt};
pub use types::{
    Attributes, GenerateRequest, Location, Persona, Profile, Prompt, PromptTemplate,
    RoleResponse, TemplateDraft, DEFAULT_PROFILE_ID,
};
pub use variables::{collect_variables, extract_variables};
