use super::{api_client, user_error};
use crate::config::Config;

pub async fn cmd_register(
    config: &Config,
    name: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let session = client
        .register(name, email, password)
        .await
        .map_err(user_error)?;

    println!("✓ Registered and logged in as {}", session.user.email);
    Ok(())
}

pub async fn cmd_login(
    config: &Config,
    email: &str,
    password: &str,
    emergency: bool,
) -> anyhow::Result<()> {
    let client = api_client(config)?;

    let session = if emergency {
        client.direct_login(email, password).await
    } else {
        client.login(email, password).await
    }
    .map_err(user_error)?;

    println!("✓ Logged in as {} <{}>", session.user.name, session.user.email);
    if session.emergency_key.is_some() {
        println!("  Emergency access enabled for this session");
    }
    println!("  Session saved to {}", client.session_store().path().display());
    Ok(())
}

pub fn cmd_logout(config: &Config) -> anyhow::Result<()> {
    let client = api_client(config)?;
    client.logout().map_err(user_error)?;
    println!("✓ Logged out");
    Ok(())
}

pub async fn cmd_whoami(config: &Config) -> anyhow::Result<()> {
    let client = api_client(config)?;

    if client.current_session().is_none() {
        println!("Not logged in. Run 'mediscan login <email> <password>'.");
        return Ok(());
    }

    let user = client.me().await.map_err(user_error)?;
    println!("{} <{}>", user.name, user.email);
    println!("  Role: {} | ID: {} | joined {}", user.role, user.id, user.created_at);
    Ok(())
}
