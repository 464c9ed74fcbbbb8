mod analyze;
mod history;
mod login;
mod report;
mod seed;
mod status;
mod users;

pub use analyze::cmd_analyze;
pub use history::cmd_history;
pub use login::{cmd_login, cmd_logout, cmd_register, cmd_whoami};
pub use report::cmd_report;
pub use seed::cmd_seed;
pub use status::cmd_status;
pub use users::cmd_list_users;

use crate::client::{ApiClient, ClientError};
use crate::config::Config;

fn api_client(config: &Config) -> anyhow::Result<ApiClient> {
    ApiClient::from_config(config).map_err(user_error)
}

/// Surfaces the short message instead of the transport detail.
fn user_error(err: ClientError) -> anyhow::Error {
    tracing::debug!(error = %err, "API call failed");
    anyhow::anyhow!(err.user_message())
}
