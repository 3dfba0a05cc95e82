//! CLI user directory subcommands.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use super::print_json;
use crate::state::AppState;

/// User directory subcommands.
#[derive(Subcommand)]
pub enum UserCommand {
    /// Register a user (or rename an existing email).
    Add {
        /// Email address, unique and case-insensitive.
        email: String,

        /// Display name (defaults to the email's local part).
        #[arg(long)]
        name: Option<String>,
    },

    /// List registered users.
    List,
}

/// Handle a user subcommand.
pub async fn handle_user_command(cmd: UserCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        UserCommand::Add { email, name } => {
            let display_name = name.unwrap_or_else(|| default_display_name(&email));
            let user = state.users.upsert_user(&email, &display_name).await?;
            if json {
                return print_json(&user);
            }
            println!();
            println!(
                "  {} Registered {} <{}>",
                style("*").green().bold(),
                style(&user.display_name).cyan(),
                user.email
            );
            println!();
            Ok(())
        }
        UserCommand::List => {
            let users = state.users.list_users().await?;
            if json {
                return print_json(&users);
            }
            if users.is_empty() {
                println!();
                println!("  No users registered.");
                println!();
                return Ok(());
            }
            let mut table = Table::new();
            table
                .load_preset(presets::UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![Cell::new("Email").fg(Color::Cyan), Cell::new("Name")]);
            for user in &users {
                table.add_row(vec![Cell::new(&user.email), Cell::new(&user.display_name)]);
            }
            println!();
            println!("{table}");
            println!();
            Ok(())
        }
    }
}

fn default_display_name(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or(email)
        .to_string()
}
