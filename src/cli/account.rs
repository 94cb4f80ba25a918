// ABOUTME: CLI account commands - login (verify + store), logout, whoami, repos

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Context, Result};

use super::{LoginArgs, OutputFormat};
use crate::auth::CredentialVerifier;
use crate::config::AppConfig;
use crate::credentials::store_from_config;
use crate::models::{Credential, RemoteProfile};

pub async fn login(args: LoginArgs, config: &AppConfig) -> Result<()> {
    let token = match args.token {
        Some(token) => token,
        None => prompt_token()?,
    };
    let credential = Credential::new(args.username.trim(), token.trim())
        .with_host(config.remote.host.clone());

    let verifier = CredentialVerifier::from_config(&config.remote)?;
    let profile = verifier.verify_credential(&credential).await?;

    store_from_config(&config.credentials)
        .save(&credential)
        .context("Verified, but failed to store credentials")?;

    println!(
        "Logged in as {} ({}), token {}",
        profile.display_name(),
        profile.login,
        credential.masked_token()
    );
    Ok(())
}

pub fn logout(config: &AppConfig) -> Result<()> {
    store_from_config(&config.credentials).clear()?;
    println!("Stored credentials removed");
    Ok(())
}

pub async fn whoami(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let credential = stored_credential(config)?;
    let profile = CredentialVerifier::from_config(&config.remote)?
        .verify_credential(&credential)
        .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
        OutputFormat::Text => print_profile(&profile),
    }
    Ok(())
}

pub async fn repos(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let credential = stored_credential(config)?;
    let repos = CredentialVerifier::from_config(&config.remote)?
        .list_repositories(&credential)
        .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&repos)?),
        OutputFormat::Text => {
            for repo in &repos {
                println!(
                    "{:<30} {:>6}★ {:<12} {}",
                    repo.name,
                    repo.stars,
                    repo.language.as_deref().unwrap_or("-"),
                    repo.clone_url
                );
            }
        }
    }
    Ok(())
}

fn stored_credential(config: &AppConfig) -> Result<Credential> {
    store_from_config(&config.credentials)
        .load()?
        .ok_or_else(|| anyhow!("Not logged in. Run 'canvas login --username <name>' first."))
}

fn prompt_token() -> Result<String> {
    eprint!("Personal access token: ");
    io::stderr().flush()?;

    let mut token = String::new();
    io::stdin()
        .lock()
        .read_line(&mut token)
        .context("Failed to read token from stdin")?;
    Ok(token.trim().to_string())
}

fn print_profile(profile: &RemoteProfile) {
    println!("{} ({})", profile.display_name(), profile.login);
    if let Some(email) = &profile.email {
        println!("  email:     {email}");
    }
    if let Some(location) = &profile.location {
        println!("  location:  {location}");
    }
    if let Some(blog) = &profile.blog {
        println!("  blog:      {blog}");
    }
    println!(
        "  repos: {}  followers: {}  following: {}",
        profile.public_repos, profile.followers, profile.following
    );
    if let Some(created_at) = profile.created_at {
        println!("  joined:    {}", created_at.format("%Y-%m-%d"));
    }
}
