use crate::config::Config;
use crate::constants::defaults::{TEST_USER_EMAIL, TEST_USER_NAME, TEST_USER_PASSWORD};
use crate::db::{NewUser, Store};
use crate::models::user::Role;

pub async fn cmd_seed(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    if let Some(user) = store.get_user_by_email(TEST_USER_EMAIL).await? {
        println!("Test user already exists (ID: {})", user.id);
        return Ok(());
    }

    let user = store
        .create_user(
            NewUser {
                name: TEST_USER_NAME,
                email: TEST_USER_EMAIL,
                password: TEST_USER_PASSWORD,
                role: Role::User,
            },
            &config.security,
        )
        .await?;

    println!("✓ Created test user {} (ID: {})", user.email, user.id);
    println!("  Password: {TEST_USER_PASSWORD}");
    Ok(())
}
