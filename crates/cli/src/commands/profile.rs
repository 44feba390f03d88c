//! Profile command handler.

use clap::{Args, Subcommand};
use promptly_core::AppResult;
use promptly_prompt::{Attributes, Profile};
use uuid::Uuid;

use super::{print_json, Context};

/// Manage profiles
#[derive(Args, Debug)]
pub struct ProfileCommand {
    #[command(subcommand)]
    pub action: ProfileAction,
}

#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Create a profile
    Create {
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Attributes as a JSON object
        #[arg(long)]
        attributes: Option<String>,
    },

    /// Show one profile
    Show { id: Uuid },

    /// List every profile
    List,

    /// Change a profile's fields
    Update {
        id: Uuid,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Attributes as a JSON object (replaces existing attributes)
        #[arg(long)]
        attributes: Option<String>,
    },

    /// Delete a profile and everything scoped to it
    Delete { id: Uuid },
}

fn parse_attributes(raw: Option<&str>) -> AppResult<Option<Attributes>> {
    Ok(raw.map(serde_json::from_str).transpose()?)
}

impl ProfileCommand {
    pub fn execute(&self, ctx: &Context) -> AppResult<()> {
        tracing::info!("Executing profile command");
        tracing::debug!("Profile options: {:?}", self);

        match &self.action {
            ProfileAction::Create {
                name,
                description,
                attributes,
            } => {
                let mut profile = Profile::new(name.as_str(), description.as_str());
                profile.attributes = parse_attributes(attributes.as_deref())?;
                print_json(&ctx.service.create_profile(profile)?)
            }
            ProfileAction::Show { id } => print_json(&ctx.store().get_profile(*id)?),
            ProfileAction::List => print_json(&ctx.store().list_profiles()?),
            ProfileAction::Update {
                id,
                name,
                description,
                attributes,
            } => {
                let mut profile = ctx.store().get_profile(*id)?;
                if let Some(name) = name {
                    profile.name = name.clone();
                }
                if let Some(description) = description {
                    profile.description = description.clone();
                }
                if let Some(attributes) = parse_attributes(attributes.as_deref())? {
                    profile.attributes = Some(attributes);
                }
                print_json(&ctx.service.update_profile(profile)?)
            }
            ProfileAction::Delete { id } => {
                ctx.service.delete_profile(*id)?;
                println!("Deleted profile {}", id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptly_core::AppError;

    #[test]
    fn test_parse_attributes() {
        let attributes = parse_attributes(Some(r#"{"age": 30, "interests": ["rust"]}"#))
            .unwrap()
            .unwrap();
        assert_eq!(attributes.age, Some(30));
        assert_eq!(attributes.interests, vec!["rust"]);

        assert!(parse_attributes(None).unwrap().is_none());
        assert!(matches!(
            parse_attributes(Some("not json")),
            Err(AppError::Serialization(_))
        ));
    }
}
