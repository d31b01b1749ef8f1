use std::path::PathBuf;

use anyhow::Result;
use scanvault_core::inference::InferenceSummary;
use scanvault_core::{Archive, IndexProgress};

use super::progress_bar;

pub fn run(archive: &Archive, paths: &[PathBuf], source: Option<&str>) -> Result<()> {
    let pb = progress_bar();
    let mut failures: Vec<(PathBuf, String)> = Vec::new();

    archive.index(
        paths,
        source,
        Some(&mut |progress| match progress {
            IndexProgress::Start { total } => {
                pb.set_length(total as u64);
                pb.set_position(0);
                pb.set_message("Indexing images...");
            }
            IndexProgress::Indexed { path, summary } => {
                pb.inc(1);
                pb.set_message(format!("{} ({})", file_name(&path), describe(&summary)));
            }
            IndexProgress::AlreadyIndexed { path } => {
                pb.inc(1);
                pb.set_message(format!("{} already indexed", file_name(&path)));
            }
            IndexProgress::Failed { path, error } => {
                pb.inc(1);
                failures.push((path, error));
            }
            IndexProgress::Complete(report) => {
                pb.finish_with_message(format!(
                    "{} new, {} already indexed, {} failed",
                    report.indexed, report.existing, report.failed
                ));
            }
        }),
    )?;

    for (path, error) in &failures {
        println!("  failed: {}: {error}", path.display());
    }
    println!("Index complete.");
    Ok(())
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// One-line account of what indexing found in a file.
pub(crate) fn describe(summary: &InferenceSummary) -> String {
    let mut parts = Vec::new();
    if summary.faces > 0 {
        parts.push(format!("{} faces", summary.faces));
    }
    if summary.pets > 0 {
        parts.push(format!("{} pets", summary.pets));
    }
    if summary.tags > 0 {
        parts.push(format!("{} tags", summary.tags));
    }
    if let Some(location) = &summary.location {
        parts.push(location.country_name().unwrap_or(location.country_code()).to_string());
    }
    if let Some(date) = &summary.date {
        parts.push(date.to_string());
    }
    if parts.is_empty() {
        "no metadata".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanvault_core::domain::RoughLocation;

    #[test]
    fn test_describe_empty_summary() {
        assert_eq!(describe(&InferenceSummary::default()), "no metadata");
    }

    #[test]
    fn test_describe_lists_found_facts() {
        let summary = InferenceSummary {
            faces: 2,
            tags: 5,
            location: Some(RoughLocation::new("DE", None, None, None).unwrap()),
            ..Default::default()
        };
        assert_eq!(describe(&summary), "2 faces, 5 tags, Germany");
    }
}
