//! Behavior every backend must share.

use crate::jsonstore::FileStorage;
use crate::service::PromptService;
use crate::sqlite::SqliteStorage;
use crate::store::Storage;
use promptly_core::AppError;
use promptly_prompt::{
    compose_template, GenerateRequest, Persona, Profile, Prompt, PromptTemplate, TemplateDraft,
    DEFAULT_PROFILE_ID,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

#[cfg(test)]
mod tests {
    use super::*;

    /// One fresh store per backend, each in its own directory.
    fn backends() -> Vec<(TempDir, Arc<dyn Storage>)> {
        let json_dir = TempDir::new().unwrap();
        let json: Arc<dyn Storage> = Arc::new(FileStorage::open(json_dir.path()).unwrap());

        let sqlite_dir = TempDir::new().unwrap();
        let sqlite: Arc<dyn Storage> =
            Arc::new(SqliteStorage::open(sqlite_dir.path().join("promptly.db"), 2).unwrap());

        vec![(json_dir, json), (sqlite_dir, sqlite)]
    }

    fn draft(persona_id: Uuid, task: &str, guideline: &str) -> TemplateDraft {
        TemplateDraft {
            name: "review".to_string(),
            persona_id,
            task: task.to_string(),
            answer_guideline: guideline.to_string(),
            profile_id: None,
        }
    }

    fn template_for(persona: &Persona, task: &str) -> PromptTemplate {
        compose_template(persona, &draft(persona.id, task, "Focus on {{focus}}"))
    }

    fn prompt_for(template: &PromptTemplate, profile_id: Uuid) -> Prompt {
        Prompt {
            id: Uuid::nil(),
            name: "p".to_string(),
            template_id: template.id,
            template_version: template.version,
            values: BTreeMap::new(),
            content: template.body.clone(),
            profile_id,
        }
    }

    #[test]
    fn test_review_scenario() {
        for (_dir, store) in backends() {
            let backend = store.backend();
            let service = PromptService::new(store.clone());

            let persona = service
                .create_persona(Persona::new("Developer", "Reviewer"))
                .unwrap();
            let v1 = service
                .create_template(&draft(persona.id, "Review {{language}} code", "Focus on {{focus}}"))
                .unwrap();
            assert_eq!(v1.variables, vec!["language", "focus"], "{}", backend);
            assert_eq!(v1.version, 1);

            let v2 = service
                .create_template_version(
                    v1.id,
                    &draft(persona.id, "Refactor {{language}} code", "Focus on {{focus}}"),
                )
                .unwrap();
            assert_eq!(v2.version, 2);
            assert_eq!(store.get_template(v1.id).unwrap(), v2);

            let prompt = service
                .generate_prompt(&GenerateRequest {
                    template_id: v1.id,
                    template_version: None,
                    name: "go".to_string(),
                    values: HashMap::from([
                        ("language".to_string(), "Go".to_string()),
                        ("focus".to_string(), "performance".to_string()),
                    ]),
                    profile_id: None,
                })
                .unwrap();
            assert_eq!(prompt.template_version, 2);
            assert!(!prompt.content.contains("{{"), "{}", backend);
            assert!(prompt.content.contains("Refactor Go code"));
            assert!(prompt.content.contains("Focus on performance"));

            store.delete_template(v1.id, 1).unwrap();
            assert_eq!(store.get_template(v1.id).unwrap().version, 2);
            assert!(store.get_template_version(v1.id, 1).unwrap_err().is_not_found());

            let versions: Vec<u32> = store
                .list_template_versions(v1.id)
                .unwrap()
                .iter()
                .map(|t| t.version)
                .collect();
            assert_eq!(versions, vec![2]);
            assert_eq!(store.get_prompt(prompt.id).unwrap(), prompt);
        }
    }

    #[test]
    fn test_round_trips() {
        for (_dir, store) in backends() {
            let mut profile = Profile::new("Alice", "Backend engineer");
            profile.attributes = Some(promptly_prompt::Attributes {
                occupation: Some("Engineer".to_string()),
                ..Default::default()
            });
            let profile = store.create_profile(profile).unwrap();
            assert_eq!(store.get_profile(profile.id).unwrap(), profile);

            let persona = store
                .create_persona(Persona::new("Mentor", "Tutor").with_profile(profile.id))
                .unwrap();
            assert!(!persona.id.is_nil());
            assert_eq!(store.get_persona(persona.id).unwrap(), persona);

            let template = store
                .create_template(template_for(&persona, "Explain {{topic}}"))
                .unwrap();
            assert_eq!(store.get_template_version(template.id, 1).unwrap(), template);

            let mut prompt = prompt_for(&template, profile.id);
            prompt.values.insert("topic".to_string(), "ownership".to_string());
            let prompt = store.create_prompt(prompt).unwrap();
            assert_eq!(store.get_prompt(prompt.id).unwrap(), prompt);
        }
    }

    #[test]
    fn test_updates() {
        for (_dir, store) in backends() {
            let persona = store.create_persona(Persona::new("Mentor", "Tutor")).unwrap();
            let renamed = Persona {
                llm_role_display: "Mentor".to_string(),
                ..persona.clone()
            };
            store.update_persona(renamed.clone()).unwrap();
            assert_eq!(store.get_persona(persona.id).unwrap(), renamed);

            let template = store
                .create_template(template_for(&persona, "Explain {{topic}}"))
                .unwrap();
            let mut edited = template.clone();
            edited.name = "explain".to_string();
            store.update_template(edited.clone()).unwrap();
            assert_eq!(store.get_template(template.id).unwrap(), edited);

            let prompt = store
                .create_prompt(prompt_for(&template, DEFAULT_PROFILE_ID))
                .unwrap();
            let mut edited_prompt = prompt.clone();
            edited_prompt.content = "rewritten".to_string();
            store.update_prompt(edited_prompt.clone()).unwrap();
            assert_eq!(store.get_prompt(prompt.id).unwrap(), edited_prompt);

            let profile = store.create_profile(Profile::new("Bob", "")).unwrap();
            let mut edited_profile = profile.clone();
            edited_profile.description = "Data scientist".to_string();
            let updated = store.update_profile(edited_profile).unwrap();
            assert_eq!(updated.created_at, profile.created_at);
            assert!(updated.updated_at >= profile.updated_at);
            assert_eq!(store.get_profile(profile.id).unwrap().description, "Data scientist");
        }
    }

    #[test]
    fn test_missing_entities() {
        for (_dir, store) in backends() {
            let id = Uuid::new_v4();
            assert!(store.get_persona(id).unwrap_err().is_not_found());
            assert!(store.get_template(id).unwrap_err().is_not_found());
            assert!(store.get_prompt(id).unwrap_err().is_not_found());
            assert!(store.get_profile(id).unwrap_err().is_not_found());
            assert!(store.list_template_versions(id).unwrap_err().is_not_found());

            assert!(store.delete_persona(id).unwrap_err().is_not_found());
            assert!(store.delete_template(id, 1).unwrap_err().is_not_found());
            assert!(store.delete_prompt(id).unwrap_err().is_not_found());
            assert!(store.delete_profile(id).unwrap_err().is_not_found());

            let mut ghost = Persona::new("a", "b");
            ghost.id = id;
            assert!(store.update_persona(ghost).unwrap_err().is_not_found());
        }
    }

    #[test]
    fn test_reference_validation() {
        for (_dir, store) in backends() {
            let backend = store.backend();

            let orphan = Persona::new("a", "b").with_profile(Uuid::new_v4());
            assert!(
                matches!(store.create_persona(orphan), Err(AppError::Validation(_))),
                "{}",
                backend
            );

            let mut missing_persona = Persona::new("a", "b");
            missing_persona.id = Uuid::new_v4();
            assert!(matches!(
                store.create_template(template_for(&missing_persona, "x")),
                Err(AppError::Validation(_))
            ));

            let persona = store.create_persona(Persona::new("a", "b")).unwrap();
            let template = store.create_template(template_for(&persona, "x")).unwrap();

            let mut stale = prompt_for(&template, DEFAULT_PROFILE_ID);
            stale.template_version = 7;
            assert!(matches!(
                store.create_prompt(stale),
                Err(AppError::Validation(_))
            ));

            let mut foreign = prompt_for(&template, Uuid::new_v4());
            foreign.name = "foreign".to_string();
            assert!(matches!(
                store.create_prompt(foreign),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_version_rules() {
        for (_dir, store) in backends() {
            let persona = store.create_persona(Persona::new("a", "b")).unwrap();

            let mut requested = template_for(&persona, "x");
            requested.version = 5;
            let template = store.create_template(requested).unwrap();
            assert_eq!(template.version, 1);

            assert!(matches!(
                store.create_template(template.clone()),
                Err(AppError::Conflict(_))
            ));

            let mut missing = template.clone();
            missing.version = 3;
            assert!(matches!(
                store.update_template(missing),
                Err(AppError::Conflict(_))
            ));

            let mut unknown = template.clone();
            unknown.id = Uuid::new_v4();
            assert!(store
                .create_template_version(unknown)
                .unwrap_err()
                .is_not_found());

            let v2 = store.create_template_version(template.clone()).unwrap();
            let v3 = store.create_template_version(template.clone()).unwrap();
            assert_eq!((v2.version, v3.version), (2, 3));

            // Gaps are not refilled
            store.delete_template(template.id, 2).unwrap();
            let v4 = store.create_template_version(template.clone()).unwrap();
            assert_eq!(v4.version, 4);

            let all: Vec<u32> = store
                .list_templates(None)
                .unwrap()
                .iter()
                .filter(|t| t.id == template.id)
                .map(|t| t.version)
                .collect();
            assert_eq!(all.len(), 3);
        }
    }

    #[test]
    fn test_duplicate_ids_conflict() {
        for (_dir, store) in backends() {
            let persona = store.create_persona(Persona::new("a", "b")).unwrap();
            assert!(matches!(
                store.create_persona(persona.clone()),
                Err(AppError::Conflict(_))
            ));

            let profile = store.create_profile(Profile::new("p", "")).unwrap();
            assert!(matches!(
                store.create_profile(profile),
                Err(AppError::Conflict(_))
            ));

            let template = store.create_template(template_for(&persona, "x")).unwrap();
            let prompt = store
                .create_prompt(prompt_for(&template, DEFAULT_PROFILE_ID))
                .unwrap();
            assert!(matches!(
                store.create_prompt(prompt),
                Err(AppError::Conflict(_))
            ));
        }
    }

    #[test]
    fn test_persona_delete_cascades() {
        for (_dir, store) in backends() {
            let persona = store.create_persona(Persona::new("a", "b")).unwrap();
            let keep = store.create_persona(Persona::new("c", "d")).unwrap();

            let template = store.create_template(template_for(&persona, "x")).unwrap();
            store.create_template_version(template.clone()).unwrap();
            let prompt = store
                .create_prompt(prompt_for(&template, DEFAULT_PROFILE_ID))
                .unwrap();

            let kept_template = store.create_template(template_for(&keep, "y")).unwrap();
            let kept_prompt = store
                .create_prompt(prompt_for(&kept_template, DEFAULT_PROFILE_ID))
                .unwrap();

            store.delete_persona(persona.id).unwrap();

            assert!(store.list_templates_by_persona(persona.id).unwrap().is_empty());
            assert!(store.get_template(template.id).unwrap_err().is_not_found());
            assert!(store.get_prompt(prompt.id).unwrap_err().is_not_found());
            assert_eq!(store.get_prompt(kept_prompt.id).unwrap(), kept_prompt);
            assert_eq!(store.list_templates(None).unwrap(), vec![kept_template]);
        }
    }

    #[test]
    fn test_template_version_delete_cascades_prompts() {
        for (_dir, store) in backends() {
            let persona = store.create_persona(Persona::new("a", "b")).unwrap();
            let v1 = store.create_template(template_for(&persona, "x")).unwrap();
            let v2 = store.create_template_version(v1.clone()).unwrap();

            let on_v1 = store.create_prompt(prompt_for(&v1, DEFAULT_PROFILE_ID)).unwrap();
            let on_v2 = store.create_prompt(prompt_for(&v2, DEFAULT_PROFILE_ID)).unwrap();

            store.delete_template(v1.id, 1).unwrap();
            assert!(store.get_prompt(on_v1.id).unwrap_err().is_not_found());
            assert_eq!(store.get_prompt(on_v2.id).unwrap(), on_v2);
        }
    }

    #[test]
    fn test_profile_delete_cascades() {
        for (_dir, store) in backends() {
            let profile = store.create_profile(Profile::new("tenant", "")).unwrap();

            let scoped = store
                .create_persona(Persona::new("a", "b").with_profile(profile.id))
                .unwrap();
            let template = store.create_template(template_for(&scoped, "x")).unwrap();
            let prompt = store.create_prompt(prompt_for(&template, profile.id)).unwrap();

            let shared = store.create_persona(Persona::new("c", "d")).unwrap();
            let shared_template = store.create_template(template_for(&shared, "y")).unwrap();
            let scoped_prompt = store
                .create_prompt(prompt_for(&shared_template, profile.id))
                .unwrap();

            store.delete_profile(profile.id).unwrap();

            assert!(store.get_profile(profile.id).unwrap_err().is_not_found());
            assert!(store.get_persona(scoped.id).unwrap_err().is_not_found());
            assert!(store.get_template(template.id).unwrap_err().is_not_found());
            assert!(store.get_prompt(prompt.id).unwrap_err().is_not_found());
            assert!(store.get_prompt(scoped_prompt.id).unwrap_err().is_not_found());
            assert_eq!(store.get_persona(shared.id).unwrap(), shared);
            assert_eq!(store.get_template(shared_template.id).unwrap(), shared_template);
        }
    }

    #[test]
    fn test_default_profile_protected() {
        for (_dir, store) in backends() {
            assert!(store
                .list_profiles()
                .unwrap()
                .iter()
                .any(|p| p.id == DEFAULT_PROFILE_ID));
            assert!(matches!(
                store.delete_profile(DEFAULT_PROFILE_ID),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_profile_filter_includes_default() {
        for (_dir, store) in backends() {
            let mine = store.create_profile(Profile::new("mine", "")).unwrap();
            let theirs = store.create_profile(Profile::new("theirs", "")).unwrap();

            let shared = store.create_persona(Persona::new("shared", "x")).unwrap();
            let own = store
                .create_persona(Persona::new("own", "x").with_profile(mine.id))
                .unwrap();
            store
                .create_persona(Persona::new("other", "x").with_profile(theirs.id))
                .unwrap();

            let visible: Vec<Uuid> = store
                .list_personas(Some(mine.id))
                .unwrap()
                .iter()
                .map(|p| p.id)
                .collect();
            assert_eq!(visible, vec![shared.id, own.id]);
            assert_eq!(store.list_personas(None).unwrap().len(), 3);
        }
    }

    #[test]
    fn test_list_templates_by_persona() {
        for (_dir, store) in backends() {
            let first = store.create_persona(Persona::new("a", "b")).unwrap();
            let second = store.create_persona(Persona::new("c", "d")).unwrap();

            let t1 = store.create_template(template_for(&first, "x")).unwrap();
            store.create_template(template_for(&second, "y")).unwrap();
            let t1v2 = store.create_template_version(t1.clone()).unwrap();

            assert_eq!(store.list_templates_by_persona(first.id).unwrap(), vec![t1, t1v2]);
        }
    }

    #[test]
    fn test_roles_sorted_and_distinct() {
        for (_dir, store) in backends() {
            for (user, llm) in [
                ("Student", "Tutor"),
                ("Developer", "Reviewer"),
                ("Developer", "Architect"),
                ("Developer", "Reviewer"),
            ] {
                store.create_persona(Persona::new(user, llm)).unwrap();
            }

            let roles = store.get_roles(None).unwrap();
            assert_eq!(roles.user_roles, vec!["Developer", "Student"]);
            assert!(roles.llm_roles.is_empty());

            let roles = store.get_roles(Some("Developer")).unwrap();
            assert_eq!(roles.llm_roles, vec!["Architect", "Reviewer"]);

            let roles = store.get_roles(Some("Nobody")).unwrap();
            assert!(roles.llm_roles.is_empty());
        }
    }

    #[test]
    fn test_concurrent_writers() {
        for (_dir, store) in backends() {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = Arc::clone(&store);
                    std::thread::spawn(move || {
                        for j in 0..5 {
                            store
                                .create_persona(Persona::new(format!("user{}", i), format!("llm{}", j)))
                                .unwrap();
                            store.list_personas(None).unwrap();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(store.list_personas(None).unwrap().len(), 40);
        }
    }

    #[test]
    fn test_concurrent_template_versions_are_distinct() {
        for (_dir, store) in backends() {
            let persona = store.create_persona(Persona::new("a", "b")).unwrap();
            let v1 = store.create_template(template_for(&persona, "x")).unwrap();

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let base = v1.clone();
                    std::thread::spawn(move || {
                        (0..5)
                            .map(|_| store.create_template_version(base.clone()).unwrap().version)
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            let mut versions: Vec<u32> = handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect();
            versions.sort_unstable();
            assert_eq!(versions, (2..=41).collect::<Vec<u32>>());

            let stored: Vec<u32> = store
                .list_template_versions(v1.id)
                .unwrap()
                .iter()
                .map(|t| t.version)
                .collect();
            assert_eq!(stored, (1..=41).collect::<Vec<u32>>());
        }
    }
}
