//! Batched access to the external `exiftool` executable.
//!
//! Every call spawns exactly one exiftool process for the whole batch of
//! files. Calls are blocking and cannot be cancelled once the process is
//! running; bound the batch size instead. Two calls must never target the
//! same file at the same time, which callers have to guarantee.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::metadata::MetadataBundle;

/// Tags removed before a write when existing keywords and regions are
/// cleared.
const CLEAR_KEYWORD_ARGS: [&str; 6] = [
    "-RegionInfo=",
    "-KeywordInfo=",
    "-HierarchicalSubject=",
    "-CatalogSets=",
    "-TagsList=",
    "-LastKeywordXMP=",
];

/// The remaining tags managed by this crate.
const CLEAR_TEXT_ARGS: [&str; 6] = [
    "-Title=",
    "-Description=",
    "-Country=",
    "-City=",
    "-State=",
    "-Location=",
];

/// Which tag groups a read should request. At least one must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadFields {
    pub regions: bool,
    pub orientation: bool,
    /// `KeywordInfo` plus the four flat keyword lists.
    pub tags: bool,
    pub title: bool,
    pub description: bool,
    pub location: bool,
    pub dimensions: bool,
}

impl ReadFields {
    pub fn all() -> Self {
        Self {
            regions: true,
            orientation: true,
            tags: true,
            title: true,
            description: true,
            location: true,
            dimensions: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn tag_args(&self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.regions {
            args.push("-RegionInfo");
        }
        if self.orientation {
            args.push("-Orientation");
        }
        if self.tags {
            args.extend([
                "-KeywordInfo",
                "-HierarchicalSubject",
                "-CatalogSets",
                "-TagsList",
                "-LastKeywordXMP",
            ]);
        }
        if self.title {
            args.push("-Title");
        }
        if self.description {
            args.push("-Description");
        }
        if self.location {
            args.extend(["-Country", "-City", "-State", "-Location"]);
        }
        if self.dimensions {
            args.extend(["-ImageWidth", "-ImageHeight"]);
        }
        args
    }
}

/// Handle to an exiftool executable at a caller-provided path.
#[derive(Debug, Clone)]
pub struct ExifTool {
    exe: PathBuf,
}

impl ExifTool {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// Read the requested tags of every path in one invocation. The result
    /// has one bundle per path, in input order.
    pub fn read<P: AsRef<Path>>(&self, paths: &[P], fields: ReadFields) -> Result<Vec<MetadataBundle>> {
        if fields.is_empty() {
            return Err(Error::NoFieldsRequested);
        }
        let files = validate_paths(paths)?;

        let stdout = self.run(read_args(fields, &files))?;
        let mut bundles: Vec<MetadataBundle> = serde_json::from_slice(&stdout)?;
        if bundles.len() != files.len() {
            return Err(Error::ToolOutput(format!(
                "expected {} results, got {}",
                files.len(),
                bundles.len()
            )));
        }
        for (bundle, file) in bundles.iter_mut().zip(files) {
            bundle.source_file = file;
        }
        Ok(bundles)
    }

    pub fn read_one(&self, path: &Path, fields: ReadFields) -> Result<MetadataBundle> {
        self.read(&[path], fields)?
            .pop()
            .ok_or_else(|| Error::ToolOutput("empty result".to_string()))
    }

    /// Write every bundle in one invocation. Unset fields are left alone in
    /// the file; with `clear_existing`, regions and all keyword fields are
    /// removed first.
    ///
    /// A failure is reported for the whole batch. exiftool may already have
    /// rewritten some of the files when that happens.
    pub fn write(&self, bundles: &[MetadataBundle], clear_existing: bool) -> Result<()> {
        if bundles.is_empty() {
            return Err(Error::NoMetadataToWrite);
        }
        let files = validate_paths(
            &bundles.iter().map(|b| b.source_file.as_path()).collect::<Vec<_>>(),
        )?;
        let payload: Vec<MetadataBundle> = bundles
            .iter()
            .zip(&files)
            .map(|(bundle, file)| MetadataBundle {
                source_file: file.clone(),
                ..bundle.clone()
            })
            .collect();

        let mut json = tempfile::Builder::new()
            .prefix("scanvault-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut json, &payload)?;
        json.flush()?;

        let args = write_args(json.path(), clear_existing, &metadata_timestamp(), &files);
        self.run(args)?;
        Ok(())
    }

    /// Remove every tag this crate manages from the given files.
    pub fn clear<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let files = validate_paths(paths)?;
        let mut args: Vec<OsString> = vec!["-overwrite_original".into()];
        args.extend(CLEAR_KEYWORD_ARGS.iter().chain(&CLEAR_TEXT_ARGS).map(OsString::from));
        args.extend(files.into_iter().map(OsString::from));
        self.run(args)?;
        Ok(())
    }

    fn run(&self, args: Vec<OsString>) -> Result<Vec<u8>> {
        debug!("Running {} with {} arguments", self.exe.display(), args.len());
        let output = Command::new(&self.exe)
            .args(&args)
            .output()
            .map_err(|source| Error::ToolSpawn {
                exe: self.exe.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            for line in stderr.lines() {
                error!("exiftool: {line}");
            }
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                info!("exiftool: {line}");
            }
            return Err(Error::ToolFailed {
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }
        for line in stderr.lines() {
            warn!("exiftool: {line}");
        }
        debug!("exiftool returned {} bytes", output.stdout.len());
        Ok(output.stdout)
    }
}

/// Check every path up front so no process is spawned for a bad batch.
fn validate_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    if paths.is_empty() {
        return Err(Error::NoImagePaths);
    }
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            if !path.exists() {
                return Err(Error::ImagePathNotFound(path.to_path_buf()));
            }
            if !path.is_file() {
                return Err(Error::ImagePathNotFile(path.to_path_buf()));
            }
            Ok(path.canonicalize()?)
        })
        .collect()
}

fn read_args(fields: ReadFields, files: &[PathBuf]) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-struct", "-json", "-n"].into_iter().map(OsString::from).collect();
    args.extend(fields.tag_args().into_iter().map(OsString::from));
    args.extend(files.iter().map(OsString::from));
    args
}

fn write_args(json: &Path, clear_existing: bool, timestamp: &str, files: &[PathBuf]) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-struct", "-n", "-overwrite_original", "-wm", "wcg"]
        .into_iter()
        .map(OsString::from)
        .collect();
    if clear_existing {
        args.extend(CLEAR_KEYWORD_ARGS.iter().map(OsString::from));
    }
    args.push(format!("-MetadataDate={timestamp}").into());

    let mut json_arg = OsString::from("-json=");
    json_arg.push(json);
    args.push(json_arg);

    args.extend(files.iter().map(OsString::from));
    args
}

fn metadata_timestamp() -> String {
    chrono::Local::now()
        .format("%Y:%m:%d %H:%M:%S%.6f%:z")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_read_requires_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        std::fs::write(&file, b"jpeg").unwrap();

        let tool = ExifTool::new("/nonexistent/exiftool");
        let err = tool.read(&[&file], ReadFields::default()).unwrap_err();
        assert!(matches!(err, Error::NoFieldsRequested));
    }

    #[test]
    fn test_read_requires_paths() {
        let tool = ExifTool::new("/nonexistent/exiftool");
        let paths: [&Path; 0] = [];
        let fields = ReadFields {
            regions: true,
            ..Default::default()
        };
        let err = tool.read(&paths, fields).unwrap_err();
        assert!(matches!(err, Error::NoImagePaths));
    }

    #[test]
    fn test_validate_paths_rejects_missing_and_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.jpg");

        assert!(matches!(
            validate_paths(&[&missing]).unwrap_err(),
            Error::ImagePathNotFound(p) if p == missing
        ));
        assert!(matches!(
            validate_paths(&[tmp.path()]).unwrap_err(),
            Error::ImagePathNotFile(_)
        ));
    }

    #[test]
    fn test_write_requires_bundles() {
        let tool = ExifTool::new("/nonexistent/exiftool");
        assert!(matches!(tool.write(&[], false).unwrap_err(), Error::NoMetadataToWrite));
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        std::fs::write(&file, b"jpeg").unwrap();

        let tool = ExifTool::new(tmp.path().join("no-such-exiftool"));
        let err = tool.read(&[&file], ReadFields::all()).unwrap_err();
        assert!(matches!(err, Error::ToolSpawn { .. }));
    }

    #[test]
    fn test_read_args_only_request_asked_fields() {
        let fields = ReadFields {
            regions: true,
            title: true,
            ..Default::default()
        };
        let args = as_strings(&read_args(fields, &[PathBuf::from("/p/a.jpg"), PathBuf::from("/p/b.jpg")]));
        assert_eq!(
            args,
            vec!["-struct", "-json", "-n", "-RegionInfo", "-Title", "/p/a.jpg", "/p/b.jpg"]
        );
    }

    #[test]
    fn test_read_args_tags_request_all_keyword_fields() {
        let fields = ReadFields {
            tags: true,
            ..Default::default()
        };
        let args = as_strings(&read_args(fields, &[PathBuf::from("/p/a.jpg")]));
        for tag in ["-KeywordInfo", "-HierarchicalSubject", "-CatalogSets", "-TagsList", "-LastKeywordXMP"] {
            assert!(args.contains(&tag.to_string()), "missing {tag}");
        }
    }

    #[test]
    fn test_write_args() {
        let files = vec![PathBuf::from("/p/a.jpg")];
        let plain = as_strings(&write_args(Path::new("/tmp/x.json"), false, "2024:01:01 00:00:00", &files));
        assert_eq!(
            plain,
            vec![
                "-struct",
                "-n",
                "-overwrite_original",
                "-wm",
                "wcg",
                "-MetadataDate=2024:01:01 00:00:00",
                "-json=/tmp/x.json",
                "/p/a.jpg",
            ]
        );

        let clearing = as_strings(&write_args(Path::new("/tmp/x.json"), true, "now", &files));
        let clear_at = clearing.iter().position(|a| a == "-KeywordInfo=").unwrap();
        let json_at = clearing.iter().position(|a| a.starts_with("-json=")).unwrap();
        assert!(clear_at < json_at);
    }
}
