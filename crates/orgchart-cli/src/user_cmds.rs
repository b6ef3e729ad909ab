//! Operator-mode CLI handlers for `orgchart user` subcommands and
//! `orgchart share`.

use anyhow::Result;

use orgchart_core::permission::Caller;
use orgchart_core::service::PlanService;

use crate::UserCommands;

/// Dispatch a `UserCommands` variant to the appropriate handler.
pub async fn run_user_command(
    command: UserCommands,
    service: &PlanService,
    operator: &Caller,
) -> Result<()> {
    match command {
        UserCommands::List => {
            let users = service.list_shared_users(operator).await?;
            if users.is_empty() {
                println!("No users found.");
                return Ok(());
            }
            let email_w = users.iter().map(|u| u.email.len()).max().unwrap_or(5).max(5);
            println!("{:<email_w$}  {:<10}  {:<16}  ADDED BY", "EMAIL", "PERMISSION", "ADDED");
            for user in &users {
                let added = user
                    .added_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{:<email_w$}  {:<10}  {:<16}  {}",
                    user.email, user.permission, added, user.added_by,
                );
            }
        }
        UserCommands::Add { email, permission } => {
            let entry = service.add_shared_user(operator, &email, permission).await?;
            println!("Added {} as {}.", entry.email, entry.permission);
        }
        UserCommands::Update { email, permission } => {
            let entry = service
                .update_user_permission(operator, &email, permission)
                .await?;
            println!("{} is now {}.", entry.email, entry.permission);
        }
        UserCommands::Remove { email } => {
            service.remove_shared_user(operator, &email).await?;
            println!("Removed {email}.");
        }
    }
    Ok(())
}

/// `orgchart share`: issue a view-only link.
pub async fn run_share(service: &PlanService, operator: &Caller) -> Result<()> {
    let link = service.generate_share_link(operator).await?;
    println!("{}", link.url);
    eprintln!(
        "Valid until {}.",
        link.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}
