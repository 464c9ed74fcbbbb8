use crate::config::Config;
use crate::db::Store;

pub async fn cmd_list_users(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let users = store.list_users().await?;

    if users.is_empty() {
        println!("No registered users.");
        println!("Run 'mediscan seed' to create the test user.");
        return Ok(());
    }

    println!("Registered Users ({}):", users.len());
    println!("{:-<70}", "");

    for user in users {
        let emergency = if user.emergency_key.is_some() {
            " [emergency key]"
        } else {
            ""
        };
        println!("{:>4}  {} <{}>{}", user.id, user.name, user.email, emergency);
        println!("      {} | joined {}", user.role, user.created_at);
    }

    Ok(())
}
