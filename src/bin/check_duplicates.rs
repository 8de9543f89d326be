use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use tracing::info;

use whisper_batch::duplicates;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("whisper_batch=info")
        .init();

    let matches = Command::new("check-duplicates")
        .version("0.1.0")
        .about("Report transcript files containing repeated segment lines")
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Directory containing *_timestamped.txt transcripts")
                .default_value("./output")
        )
        .get_matches();

    let output_dir = PathBuf::from(matches.get_one::<String>("output-dir").unwrap());

    info!("🔎 Checking transcripts under: {}", output_dir.display());

    let report = duplicates::check_output_dir(&output_dir)?;
    info!("{}", report);

    for file in &report.flagged {
        for line in &file.duplicates {
            info!(
                "   {} × \"{}\" in {}",
                line.count,
                line.text,
                file.path.display()
            );
        }
    }

    Ok(())
}
