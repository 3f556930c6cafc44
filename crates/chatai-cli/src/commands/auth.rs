use anyhow::{Result, bail};
use chatai_client::RegisterRequest;
use colored::Colorize;
use serde_json::json;

use super::CommandContext;
use crate::cli::RegisterArgs;
use crate::output::json::print_json;

pub async fn register(ctx: &mut CommandContext, args: RegisterArgs) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password.is_empty() || password != confirm {
        bail!("Passwords are empty or do not match");
    }

    let payload = RegisterRequest {
        email: args.email,
        firstname: args.firstname,
        lastname: args.lastname,
        password,
    };
    let token = ctx.api.register(&payload).await?;
    ctx.store.set_token(Some(token.token))?;
    tracing::info!(email = %payload.email, "Registered account");

    report(ctx, "Registered", &payload.email)
}

pub async fn login(ctx: &mut CommandContext, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let token = ctx.api.authenticate(email, &password).await?;
    ctx.store.set_token(Some(token.token))?;
    tracing::info!(email, "Signed in");

    report(ctx, "Signed in", email)
}

pub fn logout(ctx: &mut CommandContext) -> Result<()> {
    ctx.store.clear()?;

    if ctx.format.is_json() {
        return print_json(&json!({ "signed_in": false }));
    }
    println!("{} Signed out", "✓".green());
    Ok(())
}

fn report(ctx: &CommandContext, action: &str, email: &str) -> Result<()> {
    if ctx.format.is_json() {
        return print_json(&json!({ "signed_in": true, "email": email }));
    }
    println!("{} {action} as {email}", "✓".green());
    println!("  Token saved to {}", ctx.store.path().display());
    Ok(())
}
