use std::path::Path;
use std::sync::Arc;

use super::{api_client, user_error};
use crate::client::ProgressFn;
use crate::config::Config;

pub async fn cmd_analyze(config: &Config, path: &str, emergency: bool) -> anyhow::Result<()> {
    let client = api_client(config)?;

    let progress: ProgressFn = Arc::new(|sent, total| {
        if total > 0 {
            eprint!("\rUploading... {:>3}%", sent * 100 / total);
        }
    });

    let result = client
        .analyze_file(Path::new(path), emergency, Some(progress))
        .await;
    eprintln!();
    let result = result.map_err(user_error)?;

    println!("Analysis #{} - {}", result.analysis_id, result.filename);
    println!("{:-<70}", "");
    for prediction in &result.predictions {
        println!(
            "  {:<20} {:>6.2}%",
            prediction.label,
            prediction.probability * 100.0
        );
    }
    println!("{:-<70}", "");
    println!("Source: {} | {}", result.source, result.timestamp);
    println!("Image:  {}", result.image_url);

    Ok(())
}
