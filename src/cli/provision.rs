//! taskdesk provision subcommands
//!
//! Operator commands against the local store. They bypass sign-in, the
//! same way a hosted backend's dashboard would.

use super::{Context, ProvisionCommands};
use crate::backend::SignUpRequest;
use crate::error::Result;
use crate::events::EventKind;
use crate::output::{emit_success, HumanOutput};
use crate::profile::{Profile, Role};

pub fn run(ctx: &mut Context, command: ProvisionCommands) -> Result<()> {
    match command {
        ProvisionCommands::User {
            email,
            password,
            first_name,
            department,
            role,
        } => {
            let role: Role = role.parse()?;
            let profile = ctx.local.provision_user(
                SignUpRequest {
                    email: email.clone(),
                    password,
                    first_name,
                    department,
                },
                role,
            )?;
            report(ctx, "provision user", "Account provisioned", &email, &profile)
        }
        ProvisionCommands::Role { email, role } => {
            let role: Role = role.parse()?;
            let email = email.trim().to_ascii_lowercase();
            let profile = ctx.local.set_role(&email, role)?;
            report(ctx, "provision role", "Role updated", &email, &profile)
        }
    }
}

fn report(
    ctx: &mut Context,
    command: &str,
    header: &str,
    email: &str,
    profile: &Profile,
) -> Result<()> {
    ctx.event(
        EventKind::UserProvisioned,
        Some(profile.id),
        serde_json::json!({ "email": email, "profile": profile }),
    )?;

    let mut human = HumanOutput::new(format!("{header}: {email}"));
    human.push_summary("user", profile.id.to_string());
    human.push_summary("role", profile.role.to_string());
    if let Some(department) = &profile.department {
        human.push_summary("department", department.clone());
    }
    human.push_next_step(format!("taskdesk login --email {email}"));
    emit_success(ctx.output, command, profile, Some(&human))
}
