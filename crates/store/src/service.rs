//! Template and prompt workflows on top of a [`Storage`].
//!
//! The service owns the derived template fields: callers hand in drafts,
//! the service looks up the persona, composes the template body and
//! variables, and only then writes through the store. Prompt generation
//! renders a stored template version and persists the result.

use promptly_core::{AppError, AppResult};
use promptly_prompt::{
    compose_template, render, GenerateRequest, Persona, Profile, Prompt, PromptTemplate,
    TemplateDraft, DEFAULT_PROFILE_ID,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::store::Storage;
use crate::tracking::{Activity, ActivityEvent, ActivityTracker, TracingTracker};

#[derive(Clone)]
pub struct PromptService {
    store: Arc<dyn Storage>,
    tracker: Arc<dyn ActivityTracker>,
}

impl PromptService {
    /// Service that logs activity through `tracing`.
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self::with_tracker(store, Arc::new(TracingTracker))
    }

    pub fn with_tracker(store: Arc<dyn Storage>, tracker: Arc<dyn ActivityTracker>) -> Self {
        Self { store, tracker }
    }

    /// Underlying store, for reads that need no workflow.
    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    fn track(&self, event: ActivityEvent) {
        self.tracker.record(event);
    }

    // Personas

    pub fn create_persona(&self, persona: Persona) -> AppResult<Persona> {
        let persona = self.store.create_persona(persona)?;
        self.track(
            ActivityEvent::new(Activity::PersonaCreated, persona.id).with_profile(persona.profile_id),
        );
        Ok(persona)
    }

    pub fn update_persona(&self, persona: Persona) -> AppResult<Persona> {
        let persona = self.store.update_persona(persona)?;
        self.track(
            ActivityEvent::new(Activity::PersonaUpdated, persona.id).with_profile(persona.profile_id),
        );
        Ok(persona)
    }

    pub fn delete_persona(&self, id: Uuid) -> AppResult<()> {
        self.store.delete_persona(id)?;
        self.track(ActivityEvent::new(Activity::PersonaDeleted, id));
        Ok(())
    }

    // Templates

    /// Persona referenced by a draft. A missing persona is a caller error.
    fn draft_persona(&self, draft: &TemplateDraft) -> AppResult<Persona> {
        self.store.get_persona(draft.persona_id).map_err(|e| {
            if e.is_not_found() {
                AppError::Validation("Invalid persona_id: persona not found".to_string())
            } else {
                e
            }
        })
    }

    /// Compose and store the first version of a template.
    pub fn create_template(&self, draft: &TemplateDraft) -> AppResult<PromptTemplate> {
        let persona = self.draft_persona(draft)?;
        let template = self.store.create_template(compose_template(&persona, draft))?;

        tracing::info!(
            template_id = %template.id,
            variables = ?template.variables,
            "Created template"
        );
        self.track(
            ActivityEvent::new(Activity::TemplateCreated, template.id)
                .with_version(template.version)
                .with_profile(template.profile_id),
        );
        Ok(template)
    }

    /// Recompose version `version` of template `id` in place.
    pub fn update_template(
        &self,
        id: Uuid,
        version: u32,
        draft: &TemplateDraft,
    ) -> AppResult<PromptTemplate> {
        let persona = self.draft_persona(draft)?;
        let mut template = compose_template(&persona, draft);
        template.id = id;
        template.version = version;

        let template = self.store.update_template(template)?;
        self.track(
            ActivityEvent::new(Activity::TemplateUpdated, template.id)
                .with_version(template.version)
                .with_profile(template.profile_id),
        );
        Ok(template)
    }

    /// Compose a draft as the next version of template `id`.
    pub fn create_template_version(
        &self,
        id: Uuid,
        draft: &TemplateDraft,
    ) -> AppResult<PromptTemplate> {
        let persona = self.draft_persona(draft)?;
        let mut template = compose_template(&persona, draft);
        template.id = id;

        let template = self.store.create_template_version(template)?;

        tracing::info!(
            template_id = %template.id,
            version = template.version,
            "Created template version"
        );
        self.track(
            ActivityEvent::new(Activity::TemplateVersioned, template.id)
                .with_version(template.version)
                .with_profile(template.profile_id),
        );
        Ok(template)
    }

    pub fn delete_template(&self, id: Uuid, version: u32) -> AppResult<()> {
        self.store.delete_template(id, version)?;
        self.track(ActivityEvent::new(Activity::TemplateDeleted, id).with_version(version));
        Ok(())
    }

    // Prompts

    /// Render a template version and persist the result.
    ///
    /// Uses the current version when the request names none.
    pub fn generate_prompt(&self, request: &GenerateRequest) -> AppResult<Prompt> {
        let template = match request.template_version {
            Some(version) => self.store.get_template_version(request.template_id, version)?,
            None => self.store.get_template(request.template_id)?,
        };

        let rendered = render(&template, &request.values);
        let prompt = Prompt {
            id: Uuid::nil(),
            name: request.name.clone(),
            template_id: template.id,
            template_version: template.version,
            values: rendered.values,
            content: rendered.content,
            profile_id: request.profile_id.unwrap_or(DEFAULT_PROFILE_ID),
        };

        let prompt = self.store.create_prompt(prompt)?;

        tracing::info!(
            prompt_id = %prompt.id,
            template_id = %prompt.template_id,
            version = prompt.template_version,
            "Generated prompt"
        );
        self.track(
            ActivityEvent::new(Activity::PromptGenerated, prompt.id)
                .with_version(prompt.template_version)
                .with_profile(prompt.profile_id),
        );
        Ok(prompt)
    }

    pub fn delete_prompt(&self, id: Uuid) -> AppResult<()> {
        self.store.delete_prompt(id)?;
        self.track(ActivityEvent::new(Activity::PromptDeleted, id));
        Ok(())
    }

    // Profiles

    pub fn create_profile(&self, profile: Profile) -> AppResult<Profile> {
        let profile = self.store.create_profile(profile)?;
        self.track(ActivityEvent::new(Activity::ProfileCreated, profile.id));
        Ok(profile)
    }

    pub fn update_profile(&self, profile: Profile) -> AppResult<Profile> {
        let profile = self.store.update_profile(profile)?;
        self.track(ActivityEvent::new(Activity::ProfileUpdated, profile.id));
        Ok(profile)
    }

    pub fn delete_profile(&self, id: Uuid) -> AppResult<()> {
        self.store.delete_profile(id)?;
        self.track(ActivityEvent::new(Activity::ProfileDeleted, id));
        Ok(())
    }
}
