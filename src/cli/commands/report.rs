use super::{api_client, user_error};
use crate::config::Config;

pub async fn cmd_report(config: &Config, id: i32) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let report = client.report(id).await.map_err(user_error)?;
    print!("{report}");
    Ok(())
}
