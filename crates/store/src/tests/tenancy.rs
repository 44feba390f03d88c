//! Tenant isolation through the pool.

use crate::pool::{TenantKey, TenantPool};
use crate::service::PromptService;
use crate::store::Storage;
use promptly_prompt::{GenerateRequest, Persona, TemplateDraft};
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use tempfile::TempDir;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenants_are_isolated() {
        let dir = TempDir::new().unwrap();
        let pool = TenantPool::new(dir.path(), 2);

        let alice = TenantKey::from_identity("u1", "alice@example.com");
        let bob = TenantKey::from_identity("u2", "bob@example.com");

        let alice_store = pool.get_store(&alice).unwrap();
        let bob_store = pool.get_store(&bob).unwrap();

        let persona = alice_store
            .create_persona(Persona::new("Developer", "Reviewer"))
            .unwrap();

        assert_eq!(alice_store.list_personas(None).unwrap().len(), 1);
        assert!(bob_store.list_personas(None).unwrap().is_empty());
        assert!(bob_store.get_persona(persona.id).unwrap_err().is_not_found());
        assert_ne!(pool.path_for(&alice), pool.path_for(&bob));
    }

    #[test]
    fn test_tenant_prompts_are_isolated() {
        let dir = TempDir::new().unwrap();
        let pool = TenantPool::new(dir.path(), 2);

        let alice = PromptService::new(
            pool.get_store(&TenantKey::from_identity("u1", "alice@example.com"))
                .unwrap(),
        );
        let bob_store = pool
            .get_store(&TenantKey::from_identity("u2", "bob@example.com"))
            .unwrap();

        let persona = alice
            .create_persona(Persona::new("Developer", "Reviewer"))
            .unwrap();
        let template = alice
            .create_template(&TemplateDraft {
                name: "review".to_string(),
                persona_id: persona.id,
                task: "Review {{language}} code".to_string(),
                answer_guideline: String::new(),
                profile_id: None,
            })
            .unwrap();
        let prompt = alice
            .generate_prompt(&GenerateRequest {
                template_id: template.id,
                template_version: None,
                name: "go review".to_string(),
                values: HashMap::from([("language".to_string(), "Go".to_string())]),
                profile_id: None,
            })
            .unwrap();

        assert_eq!(alice.store().list_prompts(None).unwrap(), vec![prompt.clone()]);
        assert!(bob_store.list_prompts(None).unwrap().is_empty());
        assert!(bob_store.get_prompt(prompt.id).unwrap_err().is_not_found());
        assert!(bob_store.get_template(template.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_store_survives_pool_restart() {
        let dir = TempDir::new().unwrap();
        let key = TenantKey::from_identity("u1", "alice@example.com");

        let persona = {
            let pool = TenantPool::new(dir.path(), 1);
            let store = pool.get_store(&key).unwrap();
            let persona = store.create_persona(Persona::new("Mentor", "Tutor")).unwrap();
            pool.shutdown().unwrap();
            persona
        };

        let pool = TenantPool::new(dir.path(), 1);
        let store = pool.get_store(&key).unwrap();
        assert_eq!(store.get_persona(persona.id).unwrap(), persona);
    }

    #[test]
    fn test_concurrent_first_access_opens_once() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(TenantPool::new(dir.path(), 1));
        let key = TenantKey::from_identity("u1", "alice@example.com");
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let key = key.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    pool.get_store(&key).unwrap()
                })
            })
            .collect();

        let stores: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for store in &stores[1..] {
            assert!(Arc::ptr_eq(&stores[0], store));
        }
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_service_over_tenant_store() {
        let dir = TempDir::new().unwrap();
        let pool = TenantPool::new(dir.path(), 1);
        let store: Arc<dyn Storage> = pool.get_store(&TenantKey::new("team")).unwrap();
        let service = PromptService::new(store);

        let persona = service
            .create_persona(Persona::new("Developer", "Reviewer"))
            .unwrap();
        let template = service
            .create_template(&TemplateDraft {
                name: "review".to_string(),
                persona_id: persona.id,
                task: "Review {{language}} code".to_string(),
                answer_guideline: String::new(),
                profile_id: None,
            })
            .unwrap();

        assert_eq!(template.variables, vec!["language"]);
        assert!(!template.body.contains("[Answer Guideline]"));
    }
}
