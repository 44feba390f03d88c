//! Template composition and rendering.

use crate::types::{Persona, PromptTemplate, TemplateDraft, DEFAULT_PROFILE_ID};
use crate::variables::{collect_variables, PLACEHOLDER_RE};
use regex::Captures;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Result of substituting values into a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// Fully substituted text
    pub content: String,

    /// Supplied values restricted to the template's variables
    pub values: BTreeMap<String, String>,
}

/// Build the persona preamble placed at the top of every template body.
pub fn build_meta_role(user_role: &str, llm_role: &str) -> String {
    format!(
        "I am a {user}.\nYou are a {llm}.\nPlease respond clearly, in a way that fits my background as a {user},\nwhile staying in your role as a {llm}.",
        user = user_role,
        llm = llm_role,
    )
}

/// Assemble the template body from its sections, skipping empty ones.
pub fn build_body(meta_role: &str, task: &str, answer_guideline: &str) -> String {
    let sections = [
        ("[Meta Role]", meta_role),
        ("[Task]", task),
        ("[Answer Guideline]", answer_guideline),
    ];

    sections
        .iter()
        .filter(|(_, text)| !text.is_empty())
        .map(|(heading, text)| format!("{}\n{}", heading, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Compose a template row from a draft and the persona it references.
///
/// Identity and version are left for the store to assign. `meta_role`,
/// `body` and `variables` are always derived here, never taken from the caller.
pub fn compose_template(persona: &Persona, draft: &TemplateDraft) -> PromptTemplate {
    let meta_role = build_meta_role(&persona.user_role_display, &persona.llm_role_display);
    let body = build_body(&meta_role, &draft.task, &draft.answer_guideline);
    let variables = collect_variables([draft.task.as_str(), draft.answer_guideline.as_str()]);

    tracing::debug!(
        persona_id = %persona.id,
        variables = ?variables,
        "Composed template"
    );

    PromptTemplate {
        id: Uuid::nil(),
        name: draft.name.clone(),
        persona_id: persona.id,
        version: 0,
        meta_role,
        task: draft.task.clone(),
        answer_guideline: draft.answer_guideline.clone(),
        body,
        variables,
        profile_id: draft.profile_id.unwrap_or(DEFAULT_PROFILE_ID),
    }
}

/// Substitute `values` into the template body.
///
/// Only names listed in `template.variables` are substituted; other keys in
/// `values` are dropped. A template variable with no supplied value renders as
/// the empty string. Substitution is a single literal pass, so placeholder
/// text inside a value is never expanded. Placeholders for names outside
/// `template.variables` are left untouched.
pub fn render(template: &PromptTemplate, values: &HashMap<String, String>) -> RenderedPrompt {
    let known: HashSet<&str> = template.variables.iter().map(String::as_str).collect();

    let retained: BTreeMap<String, String> = template
        .variables
        .iter()
        .filter_map(|name| values.get(name).map(|value| (name.clone(), value.clone())))
        .collect();

    let content = PLACEHOLDER_RE
        .replace_all(&template.body, |caps: &Captures| {
            let name = &caps[1];
            if known.contains(name) {
                retained.get(name).cloned().unwrap_or_default()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();

    let missing = template.variables.len() - retained.len();
    if missing > 0 {
        tracing::debug!(
            template_id = %template.id,
            version = template.version,
            missing,
            "Rendered with unset variables as empty"
        );
    }

    RenderedPrompt {
        content,
        values: retained,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reviewer() -> Persona {
        let mut persona = Persona::new("Developer", "Reviewer");
        persona.id = Uuid::new_v4();
        persona
    }

    fn review_draft(task: &str) -> TemplateDraft {
        TemplateDraft {
            name: "review".to_string(),
            persona_id: Uuid::nil(),
            task: task.to_string(),
            answer_guideline: "Focus on {{focus}}".to_string(),
            profile_id: None,
        }
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_build_body_sections() {
        let body = build_body("meta", "task", "guide");
        assert_eq!(body, "[Meta Role]\nmeta\n\n[Task]\ntask\n\n[Answer Guideline]\nguide");
    }

    #[test]
    fn test_build_body_skips_empty() {
        assert_eq!(build_body("", "task", ""), "[Task]\ntask");
        assert_eq!(build_body("", "", ""), "");
    }

    #[test]
    fn test_meta_role_mentions_both_roles() {
        let meta = build_meta_role("Developer", "Reviewer");
        assert!(meta.starts_with("I am a Developer."));
        assert!(meta.contains("You are a Reviewer."));
    }

    #[test]
    fn test_compose_derives_variables() {
        let persona = reviewer();
        let template = compose_template(&persona, &review_draft("Review {{language}} code"));

        assert_eq!(template.variables, vec!["language", "focus"]);
        assert_eq!(template.persona_id, persona.id);
        assert!(template.body.contains("[Meta Role]\nI am a Developer."));
        assert!(template.body.contains("[Task]\nReview {{language}} code"));
        assert_eq!(template.profile_id, DEFAULT_PROFILE_ID);
    }

    #[test]
    fn test_render_substitutes_and_filters() {
        let template = compose_template(&reviewer(), &review_draft("Review {{language}} code"));
        let rendered = render(
            &template,
            &values(&[("language", "Go"), ("focus", "performance"), ("extra", "dropped")]),
        );

        assert!(rendered.content.contains("Review Go code"));
        assert!(rendered.content.contains("Focus on performance"));
        assert!(!rendered.content.contains("{{"));
        assert_eq!(rendered.values.len(), 2);
        assert!(!rendered.values.contains_key("extra"));
    }

    #[test]
    fn test_render_missing_value_is_empty() {
        let template = compose_template(&reviewer(), &review_draft("Review {{language}} code"));
        let rendered = render(&template, &values(&[("language", "Rust")]));

        assert!(rendered.content.ends_with("Focus on "));
        assert!(!rendered.content.contains("{{focus}}"));
        assert!(!rendered.values.contains_key("focus"));
    }

    #[test]
    fn test_render_is_single_pass() {
        let template = compose_template(&reviewer(), &review_draft("Review {{language}} code"));
        let rendered = render(
            &template,
            &values(&[("language", "{{focus}}"), ("focus", "speed")]),
        );

        assert!(rendered.content.contains("Review {{focus}} code"));
        assert!(rendered.content.contains("Focus on speed"));
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let mut template = compose_template(&reviewer(), &review_draft("Review code"));
        template.body.push_str("\n{{not_a_variable}}");
        let rendered = render(&template, &values(&[("not_a_variable", "x")]));

        assert!(rendered.content.ends_with("{{not_a_variable}}"));
        assert!(rendered.values.is_empty());
    }

    #[test]
    fn test_render_idempotent() {
        let template = compose_template(&reviewer(), &review_draft("Review {{language}} code"));
        let vals = values(&[("language", "Go"), ("focus", "performance")]);
        assert_eq!(render(&template, &vals), render(&template, &vals));
    }
}
