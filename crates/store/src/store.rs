//! The storage contract shared by every backend.

use promptly_core::{AppResult, StorageBackend};
use promptly_prompt::{
    Persona, Profile, Prompt, PromptTemplate, RoleResponse, DEFAULT_PROFILE_ID,
};
use std::collections::BTreeSet;
use uuid::Uuid;

/// CRUD and versioning operations for personas, templates, prompts and profiles.
///
/// Both backends must behave identically:
/// - A nil id on create means "assign one"; creating an existing id is a `Conflict`.
/// - References (profile, persona, template version) must exist at write time,
///   otherwise the write fails with `Validation`.
/// - `get_template` returns the row with the highest version for the id.
/// - Deleting a profile, persona or template version removes its dependents.
/// - A `profile` filter keeps rows scoped to that profile or to the default profile.
///
/// Implementations serialize writers against each other and against readers;
/// readers never block one another.
pub trait Storage: Send + Sync {
    /// Which backend this is.
    fn backend(&self) -> StorageBackend;

    fn create_persona(&self, persona: Persona) -> AppResult<Persona>;
    fn get_persona(&self, id: Uuid) -> AppResult<Persona>;
    fn list_personas(&self, profile: Option<Uuid>) -> AppResult<Vec<Persona>>;
    fn update_persona(&self, persona: Persona) -> AppResult<Persona>;
    /// Also removes the persona's templates and their prompts.
    fn delete_persona(&self, id: Uuid) -> AppResult<()>;

    /// Stores the first version of a template. The version is forced to 1.
    fn create_template(&self, template: PromptTemplate) -> AppResult<PromptTemplate>;
    /// Current (highest) version of a template.
    fn get_template(&self, id: Uuid) -> AppResult<PromptTemplate>;
    fn get_template_version(&self, id: Uuid, version: u32) -> AppResult<PromptTemplate>;
    /// Every version row visible under `profile`, in insertion order.
    fn list_templates(&self, profile: Option<Uuid>) -> AppResult<Vec<PromptTemplate>>;
    /// Every version of one template, ascending.
    fn list_template_versions(&self, id: Uuid) -> AppResult<Vec<PromptTemplate>>;
    fn list_templates_by_persona(&self, persona_id: Uuid) -> AppResult<Vec<PromptTemplate>>;
    /// Rewrites the row `(template.id, template.version)` in place.
    ///
    /// A missing version is a `Conflict`.
    fn update_template(&self, template: PromptTemplate) -> AppResult<PromptTemplate>;
    /// Inserts a row with version `max(version) + 1`.
    ///
    /// Fails with `NotFound` when the id has no versions yet.
    fn create_template_version(&self, template: PromptTemplate) -> AppResult<PromptTemplate>;
    /// Deletes one version and the prompts rendered against it.
    fn delete_template(&self, id: Uuid, version: u32) -> AppResult<()>;

    fn create_prompt(&self, prompt: Prompt) -> AppResult<Prompt>;
    fn get_prompt(&self, id: Uuid) -> AppResult<Prompt>;
    fn list_prompts(&self, profile: Option<Uuid>) -> AppResult<Vec<Prompt>>;
    fn update_prompt(&self, prompt: Prompt) -> AppResult<Prompt>;
    fn delete_prompt(&self, id: Uuid) -> AppResult<()>;

    /// Stores a profile. Both timestamps are set by the store.
    fn create_profile(&self, profile: Profile) -> AppResult<Profile>;
    fn get_profile(&self, id: Uuid) -> AppResult<Profile>;
    fn list_profiles(&self) -> AppResult<Vec<Profile>>;
    /// `created_at` is preserved, `updated_at` is set by the store.
    fn update_profile(&self, profile: Profile) -> AppResult<Profile>;
    /// Removes the profile and everything scoped to it. The default profile cannot be deleted.
    fn delete_profile(&self, id: Uuid) -> AppResult<()>;

    /// Distinct user roles, plus the LLM roles paired with `user_role` when given.
    fn get_roles(&self, user_role: Option<&str>) -> AppResult<RoleResponse> {
        let personas = self.list_personas(None)?;

        let user_roles: BTreeSet<String> = personas
            .iter()
            .map(|p| p.user_role_display.clone())
            .collect();

        let llm_roles: BTreeSet<String> = match user_role {
            Some(role) => personas
                .iter()
                .filter(|p| p.user_role_display == role)
                .map(|p| p.llm_role_display.clone())
                .collect(),
            None => BTreeSet::new(),
        };

        Ok(RoleResponse {
            user_roles: user_roles.into_iter().collect(),
            llm_roles: llm_roles.into_iter().collect(),
        })
    }

    /// Release backend resources. Further operations may fail.
    fn close(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Whether a row scoped to `scope` passes the optional profile filter.
pub(crate) fn in_scope(scope: Uuid, filter: Option<Uuid>) -> bool {
    match filter {
        Some(profile) => scope == profile || scope == DEFAULT_PROFILE_ID,
        None => true,
    }
}

/// Use `id` when set, otherwise mint a fresh one.
pub(crate) fn assign_id(id: Uuid) -> Uuid {
    if id.is_nil() {
        Uuid::new_v4()
    } else {
        id
    }
}
