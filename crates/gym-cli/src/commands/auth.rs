//! Authentication and account commands.

use super::{prompt, require_session, Client};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use session_engine::AccountUpdate;

/// Login with email and password.
pub async fn login(client: &Client, email: Option<String>, format: &OutputFormat) -> Result<()> {
    if let Some(profile) = client.controller.profile() {
        output::print_success(&format!("Already logged in as {}", profile.name), format);
        return Ok(());
    }

    let email = match email {
        Some(email) => email.trim().to_string(),
        None => prompt("Email: ")?,
    };
    if email.is_empty() {
        anyhow::bail!("Email is required");
    }

    // Prompt for password (hidden)
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }

    let name = client.controller.sign_in(&email, &password).await?;
    output::print_success(&format!("Logged in as {}", name), format);
    Ok(())
}

/// Logout and clear the stored session.
pub async fn logout(client: &Client, format: &OutputFormat) -> Result<()> {
    if !client.controller.is_authenticated() {
        output::print_success("Not logged in", format);
        return Ok(());
    }
    client.controller.sign_out();
    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Show who is signed in.
pub async fn status(client: &Client, format: &OutputFormat) -> Result<()> {
    let snapshot = client.controller.snapshot();
    output::print_with(&snapshot, format, |snapshot| match &snapshot.profile {
        Some(profile) if snapshot.is_authenticated => {
            println!("Auth:     logged in");
            println!("Name:     {}", profile.name);
            println!("Email:    {}", profile.email);
            if let Some(avatar) = &profile.avatar {
                println!("Avatar:   {}", client.api.avatar_url(avatar));
            }
        }
        _ => println!("Auth:     not logged in"),
    });
    Ok(())
}

/// Create an account, then sign in with it.
pub async fn signup(client: &Client, format: &OutputFormat) -> Result<()> {
    let name = prompt("Name: ")?;
    let email = prompt("Email: ")?;
    if name.is_empty() || email.is_empty() {
        anyhow::bail!("Name and email are required");
    }

    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    client.api.sign_up(&name, &email, &password).await?;
    let name = client.controller.sign_in(&email, &password).await?;
    output::print_success(&format!("Account created. Logged in as {}", name), format);
    Ok(())
}

/// Change the display name on the server and in the stored profile.
pub async fn rename(client: &Client, name: &str, format: &OutputFormat) -> Result<()> {
    require_session(client)?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Name is required");
    }

    client
        .api
        .update_account(&AccountUpdate {
            name: name.to_string(),
            ..Default::default()
        })
        .await?;

    // The refresh path may have ended the session while the call was in flight.
    let Some(profile) = client.controller.profile() else {
        anyhow::bail!("Session ended before the profile could be saved");
    };
    client.controller.update_profile(profile.with_name(name))?;

    output::print_success(&format!("Name changed to {}", name), format);
    Ok(())
}

/// Change the account password. The server checks `old_password`.
pub async fn passwd(client: &Client, format: &OutputFormat) -> Result<()> {
    let Some(profile) = client.controller.profile() else {
        anyhow::bail!("Not logged in. Run 'gymctl login' first");
    };

    let old_password = rpassword::prompt_password("Current password: ")?;
    let password = rpassword::prompt_password("New password: ")?;
    let confirm = rpassword::prompt_password("Confirm new password: ")?;
    if old_password.is_empty() || password.is_empty() {
        anyhow::bail!("Both the current and the new password are required");
    }
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    client
        .api
        .update_account(&AccountUpdate {
            name: profile.name,
            password: Some(password),
            old_password: Some(old_password),
        })
        .await?;

    output::print_success("Password changed", format);
    Ok(())
}
