//! Writes catalog facts back into dirty image files.
//!
//! Dirty images are processed a page at a time: one batched exiftool write
//! per page, then the rewritten files are rehashed and the page is marked
//! clean in a single transaction. A page that fails at any step keeps all
//! of its images dirty for the next run.

use std::path::Path;

use rayon::ThreadPool;
use tracing::{debug, error, info};

use crate::catalog::Catalog;
use crate::domain::{ImageRecord, RoughDate, DATES_KEYWORD};
use crate::error::Result;
use crate::exiftool::{ExifTool, ReadFields};
use crate::hasher;
use crate::keywords;
use crate::metadata::{
    AreaStruct, DimensionsStruct, KeywordInfo, KeywordNode, MetadataBundle, RegionInfo, RegionKind,
    RegionStruct,
};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Progress events emitted by [`sync_dirty`].
#[derive(Debug, Clone)]
pub enum SyncProgress {
    Start { total: usize },
    PageWritten { images: usize },
    PageFailed { images: usize, error: String },
    Complete(SyncReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Images whose file was rewritten.
    pub written: usize,
    /// Images marked clean without a write.
    pub unchanged: usize,
    /// Images left dirty because their page failed.
    pub failed: usize,
}

/// Populate `bundle` from the catalog's view of the image. Returns whether
/// any field was set.
pub fn fill_from_catalog(record: &ImageRecord, bundle: &mut MetadataBundle) -> bool {
    let mut updated = fill_description(record, bundle);
    updated |= fill_orientation(record, bundle);
    updated |= fill_region_info(record, bundle);
    updated |= fill_location(record, bundle);
    updated |= fill_date(record, bundle);
    updated |= fill_tags(record, bundle);
    updated
}

fn fill_description(record: &ImageRecord, bundle: &mut MetadataBundle) -> bool {
    match &record.description {
        Some(description) => {
            bundle.description = Some(description.clone());
            true
        }
        None => false,
    }
}

fn fill_orientation(record: &ImageRecord, bundle: &mut MetadataBundle) -> bool {
    bundle.orientation = Some(record.orientation);
    true
}

/// Rebuilds the whole region list from the current boxes.
fn fill_region_info(record: &ImageRecord, bundle: &mut MetadataBundle) -> bool {
    if record.faces.is_empty() && record.pets.is_empty() {
        return false;
    }

    let faces = record.faces.iter().map(|face| RegionStruct {
        area: AreaStruct::normalized(face.bbox.center_x, face.bbox.center_y, face.bbox.width, face.bbox.height),
        name: face.person.name.clone(),
        kind: RegionKind::Face,
        description: face.person.description.clone(),
    });
    let pets = record.pets.iter().map(|pet| RegionStruct {
        area: AreaStruct::normalized(pet.bbox.center_x, pet.bbox.center_y, pet.bbox.width, pet.bbox.height),
        name: pet.pet.name.clone(),
        kind: RegionKind::Pet,
        description: pet.description.clone(),
    });

    bundle.region_info = Some(RegionInfo {
        applied_to_dimensions: match (record.width, record.height) {
            (Some(width), Some(height)) => Some(DimensionsStruct::pixels(f64::from(width), f64::from(height))),
            _ => None,
        },
        region_list: faces.chain(pets).collect(),
    });
    true
}

fn fill_location(record: &ImageRecord, bundle: &mut MetadataBundle) -> bool {
    let Some(location) = &record.location else {
        return false;
    };
    bundle.country = Some(
        location
            .country_name()
            .unwrap_or(location.country_code())
            .to_string(),
    );
    bundle.state = location.subdivision_name().map(str::to_string);
    bundle.city = location.city().map(str::to_string);
    bundle.sub_location = location.sub_location().map(str::to_string);
    true
}

fn fill_date(record: &ImageRecord, bundle: &mut MetadataBundle) -> bool {
    let Some(date) = &record.date else {
        return false;
    };
    bundle.keyword_info = Some(KeywordInfo::new(vec![date_keyword_tree(date)]));
    true
}

fn fill_tags(record: &ImageRecord, _bundle: &mut MetadataBundle) -> bool {
    debug!("Tags of image {} are not written back to the file", record.id);
    false
}

/// Encode a date as `Dates > 1980 > 12 - December > 25`, leaving out the
/// month and day when they are not known.
pub fn date_keyword_tree(date: &RoughDate) -> KeywordNode {
    let day = date.date();
    let mut year = KeywordNode::new(day.format("%Y").to_string());
    if date.month_valid() {
        let mut month = KeywordNode::new(day.format("%-m - %B").to_string());
        if date.day_valid() {
            month = month.with_child(KeywordNode::new(day.format("%-d").to_string()));
        }
        year = year.with_child(month);
    }
    KeywordNode::new(DATES_KEYWORD).with_applied(false).with_child(year)
}

/// Write every dirty image back to its file, `page_size` images per
/// exiftool call. Rehashing runs on `hash_pool`.
pub fn sync_dirty(
    catalog: &Catalog,
    tool: &ExifTool,
    hash_pool: &ThreadPool,
    page_size: usize,
    mut progress_cb: Option<&mut dyn FnMut(SyncProgress)>,
) -> Result<SyncReport> {
    let dirty = catalog.dirty_image_ids()?;
    info!("{} dirty images to sync", dirty.len());

    if let Some(ref mut cb) = progress_cb {
        cb(SyncProgress::Start { total: dirty.len() });
    }

    let mut report = SyncReport::default();
    for page in dirty.chunks(page_size.max(1)) {
        match sync_page(catalog, tool, hash_pool, page) {
            Ok((written, unchanged)) => {
                report.written += written;
                report.unchanged += unchanged;
                if let Some(ref mut cb) = progress_cb {
                    cb(SyncProgress::PageWritten { images: page.len() });
                }
            }
            Err(e) => {
                error!("Failed to sync images {page:?}: {e}");
                report.failed += page.len();
                if let Some(ref mut cb) = progress_cb {
                    cb(SyncProgress::PageFailed {
                        images: page.len(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    if let Some(ref mut cb) = progress_cb {
        cb(SyncProgress::Complete(report));
    }
    Ok(report)
}

/// Returns the number of images written and the number marked clean
/// without a write.
fn sync_page(catalog: &Catalog, tool: &ExifTool, hash_pool: &ThreadPool, ids: &[i64]) -> Result<(usize, usize)> {
    let records = ids
        .iter()
        .map(|&id| catalog.load_image(id))
        .collect::<Result<Vec<_>>>()?;

    let mut bundles = Vec::new();
    let mut written: Vec<&ImageRecord> = Vec::new();
    let mut clean: Vec<(i64, String)> = Vec::new();
    for record in &records {
        let mut bundle = MetadataBundle::new(record.path.clone());
        if fill_from_catalog(record, &mut bundle) {
            bundles.push(bundle);
            written.push(record);
        } else {
            clean.push((record.id, record.checksum.clone()));
        }
    }

    if !bundles.is_empty() {
        merge_existing_keywords(tool, &mut bundles)?;
        tool.write(&bundles, false)?;
    }

    let paths: Vec<&Path> = written.iter().map(|r| r.path.as_path()).collect();
    let checksums = hash_pool.install(|| hasher::compute_sha256_batch(&paths));
    for (record, checksum) in written.iter().zip(checksums) {
        clean.push((record.id, checksum?));
    }

    catalog.mark_clean_batch(&clean)?;
    debug!("Synced {} images, {} unchanged", written.len(), ids.len() - written.len());
    Ok((written.len(), ids.len() - written.len()))
}

/// Keep the keywords already in the files: for every bundle carrying a
/// hierarchy, read the file's current keywords, replace their `Dates` tree
/// with the catalog's, and regenerate the flat lists.
fn merge_existing_keywords(tool: &ExifTool, bundles: &mut [MetadataBundle]) -> Result<()> {
    let targets: Vec<usize> = bundles
        .iter()
        .enumerate()
        .filter(|(_, bundle)| bundle.keyword_info.is_some())
        .map(|(index, _)| index)
        .collect();
    if targets.is_empty() {
        return Ok(());
    }

    let paths: Vec<&Path> = targets.iter().map(|&i| bundles[i].source_file.as_path()).collect();
    let fields = ReadFields {
        tags: true,
        ..Default::default()
    };
    let existing = tool.read(&paths, fields)?;

    for (index, mut current) in targets.into_iter().zip(existing) {
        keywords::combine(&mut current);
        let bundle = &mut bundles[index];

        let mut hierarchy = current.keyword_info.map(|info| info.hierarchy).unwrap_or_default();
        hierarchy.retain(|root| !root.keyword.eq_ignore_ascii_case(DATES_KEYWORD));
        if let Some(info) = bundle.keyword_info.take() {
            hierarchy.extend(info.hierarchy);
        }
        bundle.keyword_info = Some(KeywordInfo::new(hierarchy));
        keywords::expand(bundle);
    }
    Ok(())
}
