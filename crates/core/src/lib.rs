pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod exiftool;
pub mod geo;
pub mod hasher;
pub mod inference;
pub mod keywords;
pub mod metadata;
pub mod scanner;
pub mod sync;

use std::path::{Path, PathBuf};

use rayon::ThreadPool;
use tracing::{error, info};

use catalog::Catalog;
use config::Config;
use domain::*;
use error::{Error, Result};
use exiftool::{ExifTool, ReadFields};
use inference::InferenceSummary;
use metadata::MetadataBundle;
use sync::{SyncProgress, SyncReport};

/// Progress events emitted while indexing.
pub enum IndexProgress {
    /// Discovery finished.
    Start { total: usize },
    /// A new image was added to the catalog.
    Indexed { path: PathBuf, summary: InferenceSummary },
    /// The image was already in the catalog.
    AlreadyIndexed { path: PathBuf },
    /// The file was skipped.
    Failed { path: PathBuf, error: String },
    Complete(IndexReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub existing: usize,
    pub failed: usize,
}

/// The main entry point for the scanvault library: a catalog plus the
/// exiftool used to read and write image files.
pub struct Archive {
    catalog: Catalog,
    tool: ExifTool,
    hash_pool: ThreadPool,
    config: Config,
}

impl Archive {
    /// Open or create the catalog named in `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let catalog = Catalog::open(&config.catalog_path)?;
        Self::with_catalog(catalog, config)
    }

    pub fn with_catalog(catalog: Catalog, config: &Config) -> Result<Self> {
        config.validate()?;
        let hash_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.hash_threads.unwrap_or(0))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            catalog,
            tool: ExifTool::new(&config.exiftool_path),
            hash_pool,
            config: config.clone(),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Index every image under `paths`.
    ///
    /// Files are hashed in parallel and read through exiftool in batches.
    /// Known images only get their path and source refreshed; new images
    /// are inserted with every fact their metadata carries, one transaction
    /// per file. A file or batch that fails is reported and skipped.
    pub fn index<P: AsRef<Path>>(
        &self,
        paths: &[P],
        source: Option<&str>,
        mut progress_cb: Option<&mut dyn FnMut(IndexProgress)>,
    ) -> Result<IndexReport> {
        let files = scanner::scan_paths(paths)?;
        info!("Found {} images to index", files.len());

        if let Some(ref mut cb) = progress_cb {
            cb(IndexProgress::Start { total: files.len() });
        }

        let mut report = IndexReport::default();
        let mut outcomes: Vec<IndexProgress> = Vec::new();

        for batch in files.chunks(self.config.read_batch_size) {
            let checksums = self.hash_pool.install(|| hasher::compute_sha256_batch(batch));

            // Known images need no exiftool read
            let mut unknown: Vec<(&PathBuf, String)> = Vec::new();
            for (path, checksum) in batch.iter().zip(checksums) {
                let result = checksum
                    .map_err(Error::from)
                    .and_then(|checksum| match self.catalog.find_image_by_checksum(&checksum)? {
                        Some(image_id) => self.refresh_existing(image_id, path, source).map(|_| None),
                        None => Ok(Some(checksum)),
                    });
                match result {
                    Ok(Some(checksum)) => unknown.push((path, checksum)),
                    Ok(None) => outcomes.push(IndexProgress::AlreadyIndexed { path: path.clone() }),
                    Err(e) => outcomes.push(failed(path, e)),
                }
            }

            if !unknown.is_empty() {
                let unknown_paths: Vec<&PathBuf> = unknown.iter().map(|(path, _)| *path).collect();
                match self.tool.read(&unknown_paths, ReadFields::all()) {
                    Ok(bundles) => {
                        for ((path, checksum), bundle) in unknown.into_iter().zip(bundles) {
                            let outcome = match self.index_new(path, checksum, source, bundle) {
                                Ok(Some(summary)) => IndexProgress::Indexed {
                                    path: path.clone(),
                                    summary,
                                },
                                Ok(None) => IndexProgress::AlreadyIndexed { path: path.clone() },
                                Err(e) => failed(path, e),
                            };
                            outcomes.push(outcome);
                        }
                    }
                    Err(e) => {
                        error!("Failed to read metadata for a batch of {} images: {e}", unknown.len());
                        let message = e.to_string();
                        for (path, _) in unknown {
                            outcomes.push(IndexProgress::Failed {
                                path: path.clone(),
                                error: message.clone(),
                            });
                        }
                    }
                }
            }

            for outcome in outcomes.drain(..) {
                match &outcome {
                    IndexProgress::Indexed { .. } => report.indexed += 1,
                    IndexProgress::AlreadyIndexed { .. } => report.existing += 1,
                    IndexProgress::Failed { .. } => report.failed += 1,
                    _ => {}
                }
                if let Some(ref mut cb) = progress_cb {
                    cb(outcome);
                }
            }
        }

        info!(
            "Indexing complete: {} new, {} existing, {} failed",
            report.indexed, report.existing, report.failed
        );
        if let Some(ref mut cb) = progress_cb {
            cb(IndexProgress::Complete(report));
        }
        Ok(report)
    }

    /// Update the source and location of an image that is already indexed.
    fn refresh_existing(&self, image_id: i64, path: &Path, source: Option<&str>) -> Result<()> {
        let record = self.catalog.load_image(image_id)?;
        info!("{} already indexed", path.display());
        if let Some(source) = source {
            if record.source.as_deref() != Some(source) {
                info!("Updating source to {source}");
                self.catalog.update_image_source(image_id, Some(source))?;
            }
        }
        if record.path != path {
            info!("Updating path from {} to {}", record.path.display(), path.display());
            self.catalog.update_image_path(image_id, path)?;
        }
        Ok(())
    }

    /// Insert a new image and everything inferred from its metadata. Returns
    /// `None` when an identical file was indexed earlier in the same run.
    fn index_new(
        &self,
        path: &Path,
        checksum: String,
        source: Option<&str>,
        mut bundle: MetadataBundle,
    ) -> Result<Option<InferenceSummary>> {
        if let Some(image_id) = self.catalog.find_image_by_checksum(&checksum)? {
            self.refresh_existing(image_id, path, source)?;
            return Ok(None);
        }

        keywords::combine(&mut bundle);
        let file_size = std::fs::metadata(path)?.len();
        let new_image = NewImage {
            path: path.to_path_buf(),
            source: source.map(str::to_string),
            checksum,
            file_size,
            width: bundle.image_width,
            height: bundle.image_height,
            orientation: bundle.orientation.unwrap_or_default(),
            description: bundle.description.clone(),
        };

        let summary = self.catalog.in_transaction(|catalog| {
            let image_id = catalog.insert_image(&new_image)?;
            let summary = inference::infer_all(catalog, image_id, &bundle)?;
            // Everything came from the file itself
            catalog.mark_clean(image_id)?;
            Ok(summary)
        })?;
        info!("{} indexing completed", path.display());
        Ok(Some(summary))
    }

    /// Write the catalog's facts into every dirty image file.
    pub fn sync(&self, progress_cb: Option<&mut dyn FnMut(SyncProgress)>) -> Result<SyncReport> {
        sync::sync_dirty(
            &self.catalog,
            &self.tool,
            &self.hash_pool,
            self.config.sync_page_size,
            progress_cb,
        )
    }

    /// Get catalog summary statistics.
    pub fn status(&self) -> Result<ArchiveStats> {
        self.catalog.stats()
    }

    pub fn image(&self, image_id: i64) -> Result<ImageRecord> {
        self.catalog.load_image(image_id)
    }

    /// Read every managed tag of one file and combine its keywords.
    pub fn read_metadata(&self, path: &Path) -> Result<MetadataBundle> {
        let mut bundle = self.tool.read_one(path, ReadFields::all())?;
        keywords::combine(&mut bundle);
        Ok(bundle)
    }

    /// Strip every managed tag from the given files.
    pub fn clear_metadata<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        self.tool.clear(paths)
    }
}

fn failed(path: &Path, e: Error) -> IndexProgress {
    error!("Failed to index {}: {e}", path.display());
    IndexProgress::Failed {
        path: path.to_path_buf(),
        error: e.to_string(),
    }
}
