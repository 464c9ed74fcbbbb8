use crate::config::Config;
use crate::db::Store;
use crate::validation::validate_history_limit;

pub async fn cmd_history(config: &Config, email: &str, limit: u64) -> anyhow::Result<()> {
    let limit = validate_history_limit(Some(limit))?;
    let store = Store::new(&config.general.database_path).await?;

    let Some(user) = store.get_user_by_email(&email.trim().to_lowercase()).await? else {
        println!("No user with e-mail {email}");
        return Ok(());
    };

    let analyses = store.list_analyses_for_user(user.id, limit).await?;

    if analyses.is_empty() {
        println!("No analyses for {}.", user.email);
        return Ok(());
    }

    println!("Recent Analyses for {} (last {}):", user.email, analyses.len());
    println!("{:-<70}", "");

    for row in analyses {
        let top = row.predictions.first().map_or_else(
            || "no findings".to_string(),
            |p| format!("{} {:.1}%", p.label, p.probability * 100.0),
        );
        println!("• #{} {} - {}", row.id, row.filename, top);
        println!("  {} | {}", row.source, row.created_at);
    }

    Ok(())
}
