use std::path::PathBuf;

use burst_detection::{scan_folder, BurstConfig, CancelToken, ScanOptions, Triage};

fn main() -> burst_detection::Result<()> {
    let folder = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let photos = scan_folder(&folder, &ScanOptions::default())?;
    println!("Found {} photos in {}", photos.len(), folder.display());

    let report = Triage::new(BurstConfig::default()).run(&photos, &CancelToken::new())?;
    println!("\nGroups: {}", report.groups.len());
    for triaged in &report.groups {
        println!(
            "  {}: {} frames over {:.2}s, pick {}",
            triaged.group.id,
            triaged.group.len(),
            triaged.group.duration_secs,
            triaged.pick.file_name()
        );
    }

    println!("\nSkipped: {}", report.skipped.len());
    for photo in &report.skipped {
        println!("  {}", photo.file_name());
    }
    Ok(())
}
