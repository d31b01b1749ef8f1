use anyhow::Result;
use scanvault_core::sync::SyncProgress;
use scanvault_core::Archive;

use super::progress_bar;

pub fn run(archive: &Archive) -> Result<()> {
    let pb = progress_bar();
    let mut failures: Vec<String> = Vec::new();

    let report = archive.sync(Some(&mut |progress| match progress {
        SyncProgress::Start { total } => {
            pb.set_length(total as u64);
            pb.set_position(0);
            pb.set_message("Writing metadata to files...");
        }
        SyncProgress::PageWritten { images } => {
            pb.inc(images as u64);
        }
        SyncProgress::PageFailed { images, error } => {
            pb.inc(images as u64);
            failures.push(error);
        }
        SyncProgress::Complete(report) => {
            pb.finish_with_message(format!(
                "{} written, {} unchanged, {} failed",
                report.written, report.unchanged, report.failed
            ));
        }
    }))?;

    for error in &failures {
        println!("  page failed: {error}");
    }
    if report.failed > 0 {
        println!("{} images stay dirty and will be retried on the next sync.", report.failed);
    }
    println!("Sync complete.");
    Ok(())
}
