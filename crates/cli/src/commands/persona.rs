//! Persona command handler.

use clap::{Args, Subcommand};
use promptly_core::AppResult;
use promptly_prompt::Persona;
use uuid::Uuid;

use super::{print_json, Context};

/// Manage personas
#[derive(Args, Debug)]
pub struct PersonaCommand {
    #[command(subcommand)]
    pub action: PersonaAction,
}

#[derive(Subcommand, Debug)]
pub enum PersonaAction {
    /// Create a persona
    Create {
        /// Role the user identifies as
        user_role: String,

        /// Role the LLM should take
        llm_role: String,

        /// Owning profile (default profile when omitted)
        #[arg(long)]
        profile: Option<Uuid>,
    },

    /// Show one persona
    Show { id: Uuid },

    /// List personas
    List {
        /// Only personas visible to this profile
        #[arg(long)]
        profile: Option<Uuid>,
    },

    /// Change a persona's roles or profile
    Update {
        id: Uuid,

        #[arg(long)]
        user_role: Option<String>,

        #[arg(long)]
        llm_role: Option<String>,

        #[arg(long)]
        profile: Option<Uuid>,
    },

    /// Delete a persona with its templates and prompts
    Delete { id: Uuid },
}

impl PersonaCommand {
    pub fn execute(&self, ctx: &Context) -> AppResult<()> {
        tracing::info!("Executing persona command");
        tracing::debug!("Persona options: {:?}", self);

        match &self.action {
            PersonaAction::Create {
                user_role,
                llm_role,
                profile,
            } => {
                let mut persona = Persona::new(user_role.as_str(), llm_role.as_str());
                if let Some(profile) = profile {
                    persona = persona.with_profile(*profile);
                }
                print_json(&ctx.service.create_persona(persona)?)
            }
            PersonaAction::Show { id } => print_json(&ctx.store().get_persona(*id)?),
            PersonaAction::List { profile } => print_json(&ctx.store().list_personas(*profile)?),
            PersonaAction::Update {
                id,
                user_role,
                llm_role,
                profile,
            } => {
                let mut persona = ctx.store().get_persona(*id)?;
                if let Some(user_role) = user_role {
                    persona.user_role_display = user_role.clone();
                }
                if let Some(llm_role) = llm_role {
                    persona.llm_role_display = llm_role.clone();
                }
                if let Some(profile) = profile {
                    persona.profile_id = *profile;
                }
                print_json(&ctx.service.update_persona(persona)?)
            }
            PersonaAction::Delete { id } => {
                ctx.service.delete_persona(*id)?;
                println!("Deleted persona {}", id);
                Ok(())
            }
        }
    }
}
