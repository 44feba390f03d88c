//! Prompt command handler.
//!
//! Renders templates with `--var name=value` pairs and manages stored prompts.

use clap::{Args, Subcommand};
use promptly_core::AppResult;
use promptly_prompt::GenerateRequest;
use std::collections::HashMap;
use uuid::Uuid;

use super::{print_json, Context};

/// Generate and manage rendered prompts
#[derive(Args, Debug)]
pub struct PromptCommand {
    #[command(subcommand)]
    pub action: PromptAction,
}

#[derive(Subcommand, Debug)]
pub enum PromptAction {
    /// Render a template and store the result
    Generate {
        /// Template to render
        template_id: Uuid,

        /// Template version (current version when omitted)
        #[arg(long)]
        version: Option<u32>,

        /// Prompt name
        #[arg(long, default_value = "")]
        name: String,

        /// Variable value as name=value (repeatable)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Owning profile
        #[arg(long)]
        profile: Option<Uuid>,

        /// Print only the rendered content
        #[arg(long)]
        raw: bool,
    },

    /// Show one prompt
    Show { id: Uuid },

    /// List prompts
    List {
        /// Only prompts visible to this profile
        #[arg(long)]
        profile: Option<Uuid>,
    },

    /// Delete a prompt
    Delete { id: Uuid },
}

/// Parse a `name=value` pair. The value may itself contain `=`.
fn parse_var(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}

impl PromptCommand {
    pub fn execute(&self, ctx: &Context) -> AppResult<()> {
        tracing::info!("Executing prompt command");
        tracing::debug!("Prompt options: {:?}", self);

        match &self.action {
            PromptAction::Generate {
                template_id,
                version,
                name,
                vars,
                profile,
                raw,
            } => {
                let request = GenerateRequest {
                    template_id: *template_id,
                    template_version: *version,
                    name: name.clone(),
                    values: vars.iter().cloned().collect::<HashMap<_, _>>(),
                    profile_id: *profile,
                };
                let prompt = ctx.service.generate_prompt(&request)?;
                if *raw {
                    println!("{}", prompt.content);
                    Ok(())
                } else {
                    print_json(&prompt)
                }
            }
            PromptAction::Show { id } => print_json(&ctx.store().get_prompt(*id)?),
            PromptAction::List { profile } => print_json(&ctx.store().list_prompts(*profile)?),
            PromptAction::Delete { id } => {
                ctx.service.delete_prompt(*id)?;
                println!("Deleted prompt {}", id);
                Ok(())
            }
        }
    }
}
