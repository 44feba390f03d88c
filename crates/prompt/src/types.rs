//! Prompt types for Promptly.
//!
//! This module defines the domain entities shared by every storage backend.
//! Field names on the wire follow the persisted JSON document layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Profile every entity falls back to when none is supplied.
///
/// Entities scoped to this profile are visible to every tenant filter.
pub const DEFAULT_PROFILE_ID: Uuid = Uuid::nil();

fn default_profile_id() -> Uuid {
    DEFAULT_PROFILE_ID
}

/// A pairing of the user's role and the role the LLM should play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Assigned by the store on create
    #[serde(rename = "persona_id", default)]
    pub id: Uuid,

    /// Role the user identifies as (e.g., "Developer")
    pub user_role_display: String,

    /// Role the LLM should take (e.g., "Reviewer")
    pub llm_role_display: String,

    /// Owning profile
    #[serde(default = "default_profile_id")]
    pub profile_id: Uuid,
}

impl Persona {
    /// Create an unsaved persona owned by the default profile.
    pub fn new(user_role_display: impl Into<String>, llm_role_display: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            user_role_display: user_role_display.into(),
            llm_role_display: llm_role_display.into(),
            profile_id: DEFAULT_PROFILE_ID,
        }
    }

    pub fn with_profile(mut self, profile_id: Uuid) -> Self {
        self.profile_id = profile_id;
        self
    }
}

/// One version of a prompt template.
///
/// `(id, version)` is unique. `meta_role`, `body` and `variables` are derived
/// from the persona and the task/guideline text whenever the template is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    #[serde(default)]
    pub id: Uuid,

    #[serde(default)]
    pub name: String,

    pub persona_id: Uuid,

    /// Starts at 1 and increases by one per new version
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub meta_role: String,

    #[serde(default)]
    pub task: String,

    #[serde(default)]
    pub answer_guideline: String,

    /// Full text with `{{variable}}` placeholders
    #[serde(rename = "template", default)]
    pub body: String,

    /// Variable names referenced by task and answer guideline
    #[serde(default)]
    pub variables: Vec<String>,

    #[serde(default = "default_profile_id")]
    pub profile_id: Uuid,
}

impl PromptTemplate {
    /// Composite key of this row.
    pub fn key(&self) -> (Uuid, u32) {
        (self.id, self.version)
    }
}

/// Client input for creating, updating or versioning a template.
///
/// Derived fields are deliberately absent: they are always recomputed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateDraft {
    #[serde(default)]
    pub name: String,

    pub persona_id: Uuid,

    #[serde(default)]
    pub task: String,

    #[serde(default)]
    pub answer_guideline: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<Uuid>,
}

/// A template rendered against concrete variable values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default)]
    pub id: Uuid,

    #[serde(default)]
    pub name: String,

    pub template_id: Uuid,

    /// Version the content was rendered against
    pub template_version: u32,

    /// Values for template variables only
    #[serde(rename = "variable_values", default)]
    pub values: BTreeMap<String, String>,

    pub content: String,

    #[serde(default = "default_profile_id")]
    pub profile_id: Uuid,
}

/// Request to render a template and persist the result as a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub template_id: Uuid,

    /// Current version when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_version: Option<u32>,

    #[serde(default)]
    pub name: String,

    /// Candidate values; keys that are not template variables are dropped
    #[serde(rename = "variable_values", default)]
    pub values: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<Uuid>,
}

/// A tenant profile with optional demographic and preference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: Uuid,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Create an unsaved profile stamped with the current time.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            name: name.into(),
            description: description.into(),
            attributes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The sentinel profile seeded into every store.
    pub fn default_profile(now: DateTime<Utc>) -> Self {
        Self {
            id: DEFAULT_PROFILE_ID,
            name: "Default".to_string(),
            description: "Default profile".to_string(),
            attributes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    /// Accepts a number or a numeric string (`30` or `"30"`).
    #[serde(
        default,
        deserialize_with = "age_from_number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub age: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expertise_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_preference: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_languages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

fn age_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Age {
        Number(u32),
        Text(String),
    }

    match Option::<Age>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Age::Number(age)) => Ok(Some(age)),
        Some(Age::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Age::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid age '{}': {}", text, e))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

/// Distinct role display strings known to a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub llm_roles: Vec<String>,
}
