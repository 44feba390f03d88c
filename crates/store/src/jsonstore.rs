//! File-backed store.
//!
//! Each entity collection lives in its own pretty-printed JSON array under
//! one directory. Every mutation takes the store-wide write lock, reads the
//! affected documents, edits them in memory and writes them back whole.
//! Reads take the shared lock for the duration of the read only.
//!
//! Writes are not atomic: a crash while a document is being written can
//! leave it truncated.

use chrono::Utc;
use promptly_core::{AppError, AppResult, StorageBackend};
use promptly_prompt::{Persona, Profile, Prompt, PromptTemplate, DEFAULT_PROFILE_ID};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::store::{assign_id, in_scope, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Personas,
    Templates,
    Prompts,
    Profiles,
}

impl Collection {
    const ALL: [Collection; 4] = [
        Collection::Personas,
        Collection::Templates,
        Collection::Prompts,
        Collection::Profiles,
    ];

    fn file_name(self) -> &'static str {
        match self {
            Collection::Personas => "persona.json",
            Collection::Templates => "prompt_template.json",
            Collection::Prompts => "prompts.json",
            Collection::Profiles => "profiles.json",
        }
    }
}

/// JSON document store rooted at one directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileStorage {
    /// Open (and create if needed) a store in `dir`.
    ///
    /// Missing documents are created as empty arrays; the profile document
    /// starts out holding the default profile.
    pub fn open(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let store = Self {
            dir,
            lock: RwLock::new(()),
        };

        for collection in Collection::ALL {
            let path = store.path(collection);
            if path.exists() {
                continue;
            }
            if collection == Collection::Profiles {
                store.save(collection, &[Profile::default_profile(Utc::now())])?;
            } else {
                store.save::<serde_json::Value>(collection, &[])?;
            }
            tracing::debug!("Created empty document {:?}", path);
        }

        tracing::info!("Opened file store at {:?}", store.dir);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    fn shared(&self) -> AppResult<RwLockReadGuard<'_, ()>> {
        self.lock
            .read()
            .map_err(|_| AppError::Storage("file store lock poisoned".to_string()))
    }

    fn exclusive(&self) -> AppResult<RwLockWriteGuard<'_, ()>> {
        self.lock
            .write()
            .map_err(|_| AppError::Storage("file store lock poisoned".to_string()))
    }

    /// Read a whole collection. A missing or empty document is an empty collection.
    fn load<T: DeserializeOwned>(&self, collection: Collection) -> AppResult<Vec<T>> {
        let data = match std::fs::read(self.path(collection)) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_slice(&data)?)
    }

    fn save<T: Serialize>(&self, collection: Collection, items: &[T]) -> AppResult<()> {
        let data = serde_json::to_vec_pretty(items)?;
        std::fs::write(self.path(collection), data)?;
        Ok(())
    }

    /// Load one collection under the shared lock.
    fn snapshot<T: DeserializeOwned>(&self, collection: Collection) -> AppResult<Vec<T>> {
        let _guard = self.shared()?;
        self.load(collection)
    }

    fn profile_known(&self, id: Uuid) -> AppResult<bool> {
        if id == DEFAULT_PROFILE_ID {
            return Ok(true);
        }
        let profiles: Vec<Profile> = self.load(Collection::Profiles)?;
        Ok(profiles.iter().any(|p| p.id == id))
    }

    fn require_profile(&self, id: Uuid) -> AppResult<()> {
        if self.profile_known(id)? {
            Ok(())
        } else {
            Err(AppError::Validation(format!("profile {} does not exist", id)))
        }
    }

    fn require_persona(&self, id: Uuid) -> AppResult<()> {
        let personas: Vec<Persona> = self.load(Collection::Personas)?;
        if personas.iter().any(|p| p.id == id) {
            Ok(())
        } else {
            Err(AppError::Validation(format!("persona {} does not exist", id)))
        }
    }

    fn require_template_version(&self, id: Uuid, version: u32) -> AppResult<()> {
        let templates: Vec<PromptTemplate> = self.load(Collection::Templates)?;
        if templates.iter().any(|t| t.key() == (id, version)) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "template {} version {} does not exist",
                id, version
            )))
        }
    }

    /// Drop prompts rendered against any of `keys` or scoped to `profile`.
    fn cascade_prompts(
        &self,
        keys: &HashSet<(Uuid, u32)>,
        profile: Option<Uuid>,
    ) -> AppResult<usize> {
        let mut prompts: Vec<Prompt> = self.load(Collection::Prompts)?;
        let before = prompts.len();
        prompts.retain(|p| {
            !keys.contains(&(p.template_id, p.template_version)) && Some(p.profile_id) != profile
        });
        let removed = before - prompts.len();
        if removed > 0 {
            self.save(Collection::Prompts, &prompts)?;
        }
        Ok(removed)
    }

    /// Drop templates owned by any of `personas` or scoped to `profile`, then their prompts.
    fn cascade_templates(&self, personas: &HashSet<Uuid>, profile: Option<Uuid>) -> AppResult<()> {
        let mut templates: Vec<PromptTemplate> = self.load(Collection::Templates)?;
        let mut removed = HashSet::new();
        templates.retain(|t| {
            let drop = personas.contains(&t.persona_id) || Some(t.profile_id) == profile;
            if drop {
                removed.insert(t.key());
            }
            !drop
        });

        let prompts = self.cascade_prompts(&removed, profile)?;
        if !removed.is_empty() {
            self.save(Collection::Templates, &templates)?;
        }

        tracing::debug!(
            templates = removed.len(),
            prompts,
            "Cascaded delete through templates"
        );
        Ok(())
    }
}

impl Storage for FileStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Json
    }

    // Persona operations

    fn create_persona(&self, mut persona: Persona) -> AppResult<Persona> {
        let _guard = self.exclusive()?;
        self.require_profile(persona.profile_id)?;

        let mut personas: Vec<Persona> = self.load(Collection::Personas)?;
        persona.id = assign_id(persona.id);
        if personas.iter().any(|p| p.id == persona.id) {
            return Err(AppError::Conflict(format!(
                "persona {} already exists",
                persona.id
            )));
        }

        personas.push(persona.clone());
        self.save(Collection::Personas, &personas)?;

        tracing::debug!("Created persona {}", persona.id);
        Ok(persona)
    }

    fn get_persona(&self, id: Uuid) -> AppResult<Persona> {
        self.snapshot::<Persona>(Collection::Personas)?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::not_found("persona", id))
    }

    fn list_personas(&self, profile: Option<Uuid>) -> AppResult<Vec<Persona>> {
        let mut personas: Vec<Persona> = self.snapshot(Collection::Personas)?;
        personas.retain(|p| in_scope(p.profile_id, profile));
        Ok(personas)
    }

    fn update_persona(&self, persona: Persona) -> AppResult<Persona> {
        let _guard = self.exclusive()?;

        let mut personas: Vec<Persona> = self.load(Collection::Personas)?;
        let slot = personas
            .iter_mut()
            .find(|p| p.id == persona.id)
            .ok_or_else(|| AppError::not_found("persona", persona.id))?;
        self.require_profile(persona.profile_id)?;

        *slot = persona.clone();
        self.save(Collection::Personas, &personas)?;

        tracing::debug!("Updated persona {}", persona.id);
        Ok(persona)
    }

    fn delete_persona(&self, id: Uuid) -> AppResult<()> {
        let _guard = self.exclusive()?;

        let mut personas: Vec<Persona> = self.load(Collection::Personas)?;
        let before = personas.len();
        personas.retain(|p| p.id != id);
        if personas.len() == before {
            return Err(AppError::not_found("persona", id));
        }

        self.cascade_templates(&HashSet::from([id]), None)?;
        self.save(Collection::Personas, &personas)?;

        tracing::debug!("Deleted persona {}", id);
        Ok(())
    }

    // Template operations

    fn create_template(&self, mut template: PromptTemplate) -> AppResult<PromptTemplate> {
        let _guard = self.exclusive()?;
        self.require_persona(template.persona_id)?;
        self.require_profile(template.profile_id)?;

        let mut templates: Vec<PromptTemplate> = self.load(Collection::Templates)?;
        template.id = assign_id(template.id);
        template.version = 1;
        if templates.iter().any(|t| t.id == template.id) {
            return Err(AppError::Conflict(format!(
                "template {} already exists",
                template.id
            )));
        }

        templates.push(template.clone());
        self.save(Collection::Templates, &templates)?;

        tracing::debug!("Created template {} v1", template.id);
        Ok(template)
    }

    fn get_template(&self, id: Uuid) -> AppResult<PromptTemplate> {
        self.snapshot::<PromptTemplate>(Collection::Templates)?
            .into_iter()
            .filter(|t| t.id == id)
            .max_by_key(|t| t.version)
            .ok_or_else(|| AppError::not_found("template", id))
    }

    fn get_template_version(&self, id: Uuid, version: u32) -> AppResult<PromptTemplate> {
        self.snapshot::<PromptTemplate>(Collection::Templates)?
            .into_iter()
            .find(|t| t.key() == (id, version))
            .ok_or_else(|| AppError::not_found("template version", format!("{}@{}", id, version)))
    }

    fn list_templates(&self, profile: Option<Uuid>) -> AppResult<Vec<PromptTemplate>> {
        let mut templates: Vec<PromptTemplate> = self.snapshot(Collection::Templates)?;
        templates.retain(|t| in_scope(t.profile_id, profile));
        Ok(templates)
    }

    fn list_template_versions(&self, id: Uuid) -> AppResult<Vec<PromptTemplate>> {
        let mut versions: Vec<PromptTemplate> = self
            .snapshot::<PromptTemplate>(Collection::Templates)?
            .into_iter()
            .filter(|t| t.id == id)
            .collect();
        if versions.is_empty() {
            return Err(AppError::not_found("template", id));
        }
        versions.sort_by_key(|t| t.version);
        Ok(versions)
    }

    fn list_templates_by_persona(&self, persona_id: Uuid) -> AppResult<Vec<PromptTemplate>> {
        let mut templates: Vec<PromptTemplate> = self.snapshot(Collection::Templates)?;
        templates.retain(|t| t.persona_id == persona_id);
        Ok(templates)
    }

    fn update_template(&self, template: PromptTemplate) -> AppResult<PromptTemplate> {
        let _guard = self.exclusive()?;

        let mut templates: Vec<PromptTemplate> = self.load(Collection::Templates)?;
        let slot = templates
            .iter_mut()
            .find(|t| t.key() == template.key())
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "template {} has no version {}",
                    template.id, template.version
                ))
            })?;
        self.require_persona(template.persona_id)?;
        self.require_profile(template.profile_id)?;

        *slot = template.clone();
        self.save(Collection::Templates, &templates)?;

        tracing::debug!("Updated template {} v{}", template.id, template.version);
        Ok(template)
    }

    fn create_template_version(&self, mut template: PromptTemplate) -> AppResult<PromptTemplate> {
        let _guard = self.exclusive()?;

        let mut templates: Vec<PromptTemplate> = self.load(Collection::Templates)?;
        let current = templates
            .iter()
            .filter(|t| t.id == template.id)
            .map(|t| t.version)
            .max()
            .ok_or_else(|| AppError::not_found("template", template.id))?;
        self.require_persona(template.persona_id)?;
        self.require_profile(template.profile_id)?;

        template.version = current + 1;
        templates.push(template.clone());
        self.save(Collection::Templates, &templates)?;

        tracing::debug!("Created template {} v{}", template.id, template.version);
        Ok(template)
    }

    fn delete_template(&self, id: Uuid, version: u32) -> AppResult<()> {
        let _guard = self.exclusive()?;

        let mut templates: Vec<PromptTemplate> = self.load(Collection::Templates)?;
        let before = templates.len();
        templates.retain(|t| t.key() != (id, version));
        if templates.len() == before {
            return Err(AppError::not_found(
                "template version",
                format!("{}@{}", id, version),
            ));
        }

        self.cascade_prompts(&HashSet::from([(id, version)]), None)?;
        self.save(Collection::Templates, &templates)?;

        tracing::debug!("Deleted template {} v{}", id, version);
        Ok(())
    }

    // Prompt operations

    fn create_prompt(&self, mut prompt: Prompt) -> AppResult<Prompt> {
        let _guard = self.exclusive()?;
        self.require_template_version(prompt.template_id, prompt.template_version)?;
        self.require_profile(prompt.profile_id)?;

        let mut prompts: Vec<Prompt> = self.load(Collection::Prompts)?;
        prompt.id = assign_id(prompt.id);
        if prompts.iter().any(|p| p.id == prompt.id) {
            return Err(AppError::Conflict(format!(
                "prompt {} already exists",
                prompt.id
            )));
        }

        prompts.push(prompt.clone());
        self.save(Collection::Prompts, &prompts)?;

        tracing::debug!("Created prompt {}", prompt.id);
        Ok(prompt)
    }

    fn get_prompt(&self, id: Uuid) -> AppResult<Prompt> {
        self.snapshot::<Prompt>(Collection::Prompts)?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::not_found("prompt", id))
    }

    fn list_prompts(&self, profile: Option<Uuid>) -> AppResult<Vec<Prompt>> {
        let mut prompts: Vec<Prompt> = self.snapshot(Collection::Prompts)?;
        prompts.retain(|p| in_scope(p.profile_id, profile));
        Ok(prompts)
    }

    fn update_prompt(&self, prompt: Prompt) -> AppResult<Prompt> {
        let _guard = self.exclusive()?;

        let mut prompts: Vec<Prompt> = self.load(Collection::Prompts)?;
        let slot = prompts
            .iter_mut()
            .find(|p| p.id == prompt.id)
            .ok_or_else(|| AppError::not_found("prompt", prompt.id))?;
        self.require_template_version(prompt.template_id, prompt.template_version)?;
        self.require_profile(prompt.profile_id)?;

        *slot = prompt.clone();
        self.save(Collection::Prompts, &prompts)?;

        tracing::debug!("Updated prompt {}", prompt.id);
        Ok(prompt)
    }

    fn delete_prompt(&self, id: Uuid) -> AppResult<()> {
        let _guard = self.exclusive()?;

        let mut prompts: Vec<Prompt> = self.load(Collection::Prompts)?;
        let before = prompts.len();
        prompts.retain(|p| p.id != id);
        if prompts.len() == before {
            return Err(AppError::not_found("prompt", id));
        }
        self.save(Collection::Prompts, &prompts)?;

        tracing::debug!("Deleted prompt {}", id);
        Ok(())
    }

    // Profile operations

    fn create_profile(&self, mut profile: Profile) -> AppResult<Profile> {
        let _guard = self.exclusive()?;

        let mut profiles: Vec<Profile> = self.load(Collection::Profiles)?;
        profile.id = assign_id(profile.id);
        if profiles.iter().any(|p| p.id == profile.id) {
            return Err(AppError::Conflict(format!(
                "profile {} already exists",
                profile.id
            )));
        }

        let now = Utc::now();
        profile.created_at = now;
        profile.updated_at = now;
        profiles.push(profile.clone());
        self.save(Collection::Profiles, &profiles)?;

        tracing::debug!("Created profile {}", profile.id);
        Ok(profile)
    }

    fn get_profile(&self, id: Uuid) -> AppResult<Profile> {
        self.snapshot::<Profile>(Collection::Profiles)?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::not_found("profile", id))
    }

    fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        self.snapshot(Collection::Profiles)
    }

    fn update_profile(&self, mut profile: Profile) -> AppResult<Profile> {
        let _guard = self.exclusive()?;

        let mut profiles: Vec<Profile> = self.load(Collection::Profiles)?;
        let slot = profiles
            .iter_mut()
            .find(|p| p.id == profile.id)
            .ok_or_else(|| AppError::not_found("profile", profile.id))?;

        profile.created_at = slot.created_at;
        profile.updated_at = Utc::now();
        *slot = profile.clone();
        self.save(Collection::Profiles, &profiles)?;

        tracing::debug!("Updated profile {}", profile.id);
        Ok(profile)
    }

    fn delete_profile(&self, id: Uuid) -> AppResult<()> {
        if id == DEFAULT_PROFILE_ID {
            return Err(AppError::Validation(
                "the default profile cannot be deleted".to_string(),
            ));
        }

        let _guard = self.exclusive()?;

        let mut profiles: Vec<Profile> = self.load(Collection::Profiles)?;
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        if profiles.len() == before {
            return Err(AppError::not_found("profile", id));
        }

        let mut personas: Vec<Persona> = self.load(Collection::Personas)?;
        let owned: HashSet<Uuid> = personas
            .iter()
            .filter(|p| p.profile_id == id)
            .map(|p| p.id)
            .collect();
        personas.retain(|p| !owned.contains(&p.id));

        self.cascade_templates(&owned, Some(id))?;
        if !owned.is_empty() {
            self.save(Collection::Personas, &personas)?;
        }
        self.save(Collection::Profiles, &profiles)?;

        tracing::debug!("Deleted profile {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let store = FileStorage::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_documents() {
        let (dir, _store) = open();
        for collection in Collection::ALL {
            assert!(dir.path().join(collection.file_name()).exists());
        }

        let raw = std::fs::read_to_string(dir.path().join("persona.json")).unwrap();
        assert_eq!(raw.trim(), "[]");
    }

    #[test]
    fn test_open_seeds_default_profile() {
        let (_dir, store) = open();
        let profiles = store.list_profiles().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id, DEFAULT_PROFILE_ID);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let created = {
            let store = FileStorage::open(dir.path()).unwrap();
            store.create_persona(Persona::new("Mentor", "Tutor")).unwrap()
        };

        let store = FileStorage::open(dir.path()).unwrap();
        assert_eq!(store.get_persona(created.id).unwrap(), created);
    }

    #[test]
    fn test_missing_document_is_empty() {
        let (dir, store) = open();
        std::fs::remove_file(dir.path().join("prompts.json")).unwrap();
        assert!(store.list_prompts(None).unwrap().is_empty());
    }

    #[test]
    fn test_blank_document_is_empty() {
        let (dir, store) = open();
        std::fs::write(dir.path().join("persona.json"), "  \n").unwrap();
        assert!(store.list_personas(None).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_document_is_serialization_error() {
        let (dir, store) = open();
        std::fs::write(dir.path().join("persona.json"), "[{\"persona_id\":").unwrap();
        assert!(matches!(
            store.list_personas(None),
            Err(AppError::Serialization(_))
        ));
    }

    #[test]
    fn test_document_layout() {
        let (dir, store) = open();
        let persona = store
            .create_persona(Persona::new("Developer", "Reviewer"))
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("persona.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["persona_id"], persona.id.to_string());
        assert_eq!(json[0]["user_role_display"], "Developer");
    }

    #[test]
    fn test_caller_supplied_duplicate_id_conflicts() {
        let (_dir, store) = open();
        let persona = store.create_persona(Persona::new("A", "B")).unwrap();

        let mut duplicate = Persona::new("C", "D");
        duplicate.id = persona.id;
        assert!(matches!(
            store.create_persona(duplicate),
            Err(AppError::Conflict(_))
        ));
    }
}
