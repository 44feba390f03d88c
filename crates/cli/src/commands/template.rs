//! Template command handler.
//!
//! Templates are written from drafts; the body, meta role and variable list
//! are always derived by the service. `update` and `new-version` start from
//! the stored row and only replace the fields given on the command line.

use clap::{Args, Subcommand};
use promptly_core::{AppError, AppResult};
use promptly_prompt::{extract_variables, PromptTemplate, TemplateDraft};
use uuid::Uuid;

use super::{print_json, Context};

/// Manage prompt templates and their versions
#[derive(Args, Debug)]
pub struct TemplateCommand {
    #[command(subcommand)]
    pub action: TemplateAction,
}

/// Draft fields shared by create, update and new-version.
#[derive(Args, Debug, Default, Clone)]
pub struct DraftArgs {
    /// Template name
    #[arg(long)]
    pub name: Option<String>,

    /// Persona the template speaks for
    #[arg(long)]
    pub persona: Option<Uuid>,

    /// Task text, may contain {{variable}} placeholders
    #[arg(long)]
    pub task: Option<String>,

    /// Answer guideline text, may contain {{variable}} placeholders
    #[arg(long)]
    pub guideline: Option<String>,

    /// Owning profile
    #[arg(long)]
    pub profile: Option<Uuid>,
}

impl DraftArgs {
    /// Draft from these arguments, falling back to `base` for anything not given.
    fn into_draft(self, base: Option<&PromptTemplate>) -> Option<TemplateDraft> {
        let persona_id = self.persona.or(base.map(|t| t.persona_id))?;
        Some(TemplateDraft {
            name: self
                .name
                .or_else(|| base.map(|t| t.name.clone()))
                .unwrap_or_default(),
            persona_id,
            task: self
                .task
                .or_else(|| base.map(|t| t.task.clone()))
                .unwrap_or_default(),
            answer_guideline: self
                .guideline
                .or_else(|| base.map(|t| t.answer_guideline.clone()))
                .unwrap_or_default(),
            profile_id: self.profile.or(base.map(|t| t.profile_id)),
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum TemplateAction {
    /// Create a template (version 1)
    Create(DraftArgs),

    /// Show the current version, or a specific one
    Show {
        id: Uuid,

        #[arg(long)]
        version: Option<u32>,
    },

    /// List template versions
    List {
        /// Only templates visible to this profile
        #[arg(long)]
        profile: Option<Uuid>,

        /// Only templates of this persona
        #[arg(long, conflicts_with = "profile")]
        persona: Option<Uuid>,
    },

    /// List every version of one template
    Versions { id: Uuid },

    /// Rewrite one version in place
    Update {
        id: Uuid,
        version: u32,

        #[command(flatten)]
        draft: DraftArgs,
    },

    /// Add the next version of a template
    NewVersion {
        id: Uuid,

        #[command(flatten)]
        draft: DraftArgs,
    },

    /// Delete one version and the prompts rendered from it
    Delete { id: Uuid, version: u32 },

    /// Show the variables a piece of text references
    Variables { text: String },
}

impl TemplateCommand {
    pub fn execute(&self, ctx: &Context) -> AppResult<()> {
        tracing::info!("Executing template command");
        tracing::debug!("Template options: {:?}", self);

        let store = ctx.store();
        match &self.action {
            TemplateAction::Create(args) => {
                let draft = args.clone().into_draft(None).ok_or_else(missing_persona)?;
                print_json(&ctx.service.create_template(&draft)?)
            }
            TemplateAction::Show { id, version } => {
                let template = match version {
                    Some(version) => store.get_template_version(*id, *version)?,
                    None => store.get_template(*id)?,
                };
                print_json(&template)
            }
            TemplateAction::List { profile, persona } => {
                let templates = match persona {
                    Some(persona) => store.list_templates_by_persona(*persona)?,
                    None => store.list_templates(*profile)?,
                };
                print_json(&templates)
            }
            TemplateAction::Versions { id } => print_json(&store.list_template_versions(*id)?),
            TemplateAction::Update { id, version, draft } => {
                let base = store.get_template_version(*id, *version)?;
                let draft = draft
                    .clone()
                    .into_draft(Some(&base))
                    .ok_or_else(missing_persona)?;
                print_json(&ctx.service.update_template(*id, *version, &draft)?)
            }
            TemplateAction::NewVersion { id, draft } => {
                let base = store.get_template(*id)?;
                let draft = draft
                    .clone()
                    .into_draft(Some(&base))
                    .ok_or_else(missing_persona)?;
                print_json(&ctx.service.create_template_version(*id, &draft)?)
            }
            TemplateAction::Delete { id, version } => {
                ctx.service.delete_template(*id, *version)?;
                println!("Deleted template {} version {}", id, version);
                Ok(())
            }
            TemplateAction::Variables { text } => print_json(&extract_variables(text)),
        }
    }
}

fn missing_persona() -> AppError {
    AppError::Validation("--persona is required".to_string())
}
