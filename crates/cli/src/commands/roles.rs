//! Roles command handler.

use clap::Args;
use promptly_core::AppResult;

use super::{print_json, Context};

/// List known user and LLM roles
#[derive(Args, Debug)]
pub struct RolesCommand {
    /// Also list LLM roles paired with this user role
    #[arg(long)]
    pub user_role: Option<String>,
}

impl RolesCommand {
    pub fn execute(&self, ctx: &Context) -> AppResult<()> {
        tracing::info!("Executing roles command");

        let roles = ctx.store().get_roles(self.user_role.as_deref())?;
        print_json(&roles)
    }
}
