//! Typed model of the exiftool tag vocabulary this crate reads and writes.
//!
//! Field names follow exiftool's JSON keys (`-struct -json -n`), see
//! <https://exiftool.org/TagNames/MWG.html> for the region and keyword
//! structures.

mod lenient;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Delimiter used by `HierarchicalSubject` and `CatalogSets`.
pub const PIPE_DELIMITER: char = '|';
/// Delimiter used by `TagsList` and `LastKeywordXMP`.
pub const SLASH_DELIMITER: char = '/';

/// EXIF orientation values, <https://exiftool.org/TagNames/EXIF.html>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Orientation {
    #[default]
    Horizontal = 1,
    MirrorHorizontal = 2,
    Rotate180 = 3,
    MirrorVertical = 4,
    MirrorHorizontalRotate270Cw = 5,
    Rotate90Cw = 6,
    MirrorHorizontalRotate90Cw = 7,
    Rotate270Cw = 8,
}

impl TryFrom<u8> for Orientation {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            1 => Orientation::Horizontal,
            2 => Orientation::MirrorHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::MirrorVertical,
            5 => Orientation::MirrorHorizontalRotate270Cw,
            6 => Orientation::Rotate90Cw,
            7 => Orientation::MirrorHorizontalRotate90Cw,
            8 => Orientation::Rotate270Cw,
            other => return Err(format!("invalid orientation value {other}")),
        })
    }
}

impl From<Orientation> for u8 {
    fn from(value: Orientation) -> Self {
        value as u8
    }
}

/// Normalized bounding box of a region, <https://exiftool.org/TagNames/XMP.html#Area>.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaStruct {
    #[serde(rename = "H")]
    pub h: f64,
    #[serde(rename = "W")]
    pub w: f64,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Unit", default = "normalized_unit")]
    pub unit: String,
    #[serde(rename = "D", default, skip_serializing_if = "Option::is_none")]
    pub d: Option<f64>,
}

fn normalized_unit() -> String {
    "normalized".to_string()
}

impl AreaStruct {
    /// A normalized box centered at (`x`, `y`).
    pub fn normalized(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            h,
            w,
            x,
            y,
            unit: normalized_unit(),
            d: None,
        }
    }
}

/// Pixel dimensions a region list was computed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionsStruct {
    #[serde(rename = "H")]
    pub h: f64,
    #[serde(rename = "W")]
    pub w: f64,
    #[serde(rename = "Unit", default = "pixel_unit")]
    pub unit: String,
}

fn pixel_unit() -> String {
    "pixel".to_string()
}

impl DimensionsStruct {
    pub fn pixels(width: f64, height: f64) -> Self {
        Self {
            h: height,
            w: width,
            unit: pixel_unit(),
        }
    }
}

/// MWG region type. Unknown types are kept verbatim so they survive a read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RegionKind {
    Face,
    Pet,
    BarCode,
    Focus,
    Other(String),
}

impl From<String> for RegionKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Face" => RegionKind::Face,
            "Pet" => RegionKind::Pet,
            "BarCode" => RegionKind::BarCode,
            "Focus" => RegionKind::Focus,
            _ => RegionKind::Other(value),
        }
    }
}

impl From<RegionKind> for String {
    fn from(value: RegionKind) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Face => f.write_str("Face"),
            RegionKind::Pet => f.write_str("Pet"),
            RegionKind::BarCode => f.write_str("BarCode"),
            RegionKind::Focus => f.write_str("Focus"),
            RegionKind::Other(other) => f.write_str(other),
        }
    }
}

/// <https://exiftool.org/TagNames/MWG.html#RegionStruct>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStruct {
    #[serde(rename = "Area")]
    pub area: AreaStruct,
    #[serde(rename = "Name", default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: RegionKind,
    #[serde(
        rename = "Description",
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

/// <https://exiftool.org/TagNames/MWG.html#RegionInfo>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInfo {
    #[serde(
        rename = "AppliedToDimensions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub applied_to_dimensions: Option<DimensionsStruct>,
    #[serde(rename = "RegionList", default)]
    pub region_list: Vec<RegionStruct>,
}

/// One node of the keyword hierarchy.
///
/// Equality is structural: label, applied flag, and children compared as a
/// set, so sibling order does not matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordNode {
    #[serde(rename = "Keyword", deserialize_with = "lenient::text")]
    pub keyword: String,
    #[serde(
        rename = "Applied",
        default,
        deserialize_with = "lenient::opt_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub applied: Option<bool>,
    #[serde(rename = "Children", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<KeywordNode>,
}

impl KeywordNode {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            applied: None,
            children: Vec::new(),
        }
    }

    pub fn with_applied(mut self, applied: bool) -> Self {
        self.applied = Some(applied);
        self
    }

    pub fn with_child(mut self, child: KeywordNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Explicit flag if present, otherwise leaves count as applied.
    pub fn is_applied(&self) -> bool {
        self.applied.unwrap_or(self.children.is_empty())
    }

    pub fn first_child(&self) -> Option<&KeywordNode> {
        self.children.first()
    }
}

impl PartialEq for KeywordNode {
    fn eq(&self, other: &Self) -> bool {
        self.keyword == other.keyword
            && self.applied == other.applied
            && self.children.iter().all(|c| other.children.contains(c))
            && other.children.iter().all(|c| self.children.contains(c))
    }
}

impl Eq for KeywordNode {}

/// <https://exiftool.org/TagNames/MWG.html#KeywordInfo>
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordInfo {
    #[serde(rename = "Hierarchy", default)]
    pub hierarchy: Vec<KeywordNode>,
}

impl KeywordInfo {
    pub fn new(hierarchy: Vec<KeywordNode>) -> Self {
        Self { hierarchy }
    }

    /// Root whose label matches `keyword`, ignoring ASCII case.
    pub fn root(&self, keyword: &str) -> Option<&KeywordNode> {
        self.hierarchy
            .iter()
            .find(|root| root.keyword.eq_ignore_ascii_case(keyword))
    }
}

fn is_none_or_empty(list: &Option<Vec<String>>) -> bool {
    list.as_ref().map_or(true, Vec::is_empty)
}

/// Everything this crate reads from, or writes to, a single image file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataBundle {
    #[serde(rename = "SourceFile")]
    pub source_file: PathBuf,

    #[serde(
        rename = "Title",
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,

    #[serde(
        rename = "Description",
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(rename = "Orientation", default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,

    /// Read-only, used to fill `AppliedToDimensions` when regions are rebuilt.
    #[serde(rename = "ImageWidth", default, skip_serializing)]
    pub image_width: Option<u32>,

    #[serde(rename = "ImageHeight", default, skip_serializing)]
    pub image_height: Option<u32>,

    #[serde(rename = "RegionInfo", default, skip_serializing_if = "Option::is_none")]
    pub region_info: Option<RegionInfo>,

    #[serde(
        rename = "HierarchicalSubject",
        default,
        deserialize_with = "lenient::opt_text_list",
        skip_serializing_if = "is_none_or_empty"
    )]
    pub hierarchical_subject: Option<Vec<String>>,

    #[serde(
        rename = "CatalogSets",
        default,
        deserialize_with = "lenient::opt_text_list",
        skip_serializing_if = "is_none_or_empty"
    )]
    pub catalog_sets: Option<Vec<String>>,

    #[serde(
        rename = "TagsList",
        default,
        deserialize_with = "lenient::opt_text_list",
        skip_serializing_if = "is_none_or_empty"
    )]
    pub tags_list: Option<Vec<String>>,

    #[serde(
        rename = "LastKeywordXMP",
        default,
        deserialize_with = "lenient::opt_text_list",
        skip_serializing_if = "is_none_or_empty"
    )]
    pub last_keyword_xmp: Option<Vec<String>>,

    #[serde(rename = "KeywordInfo", default, skip_serializing_if = "Option::is_none")]
    pub keyword_info: Option<KeywordInfo>,

    #[serde(
        rename = "Country",
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub country: Option<String>,

    #[serde(
        rename = "City",
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub city: Option<String>,

    #[serde(
        rename = "State",
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<String>,

    #[serde(
        rename = "Location",
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub sub_location: Option<String>,
}

impl MetadataBundle {
    /// An empty bundle targeting `source_file`; nothing will be written for
    /// fields left unset.
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            ..Default::default()
        }
    }

    /// True when none of the four flat keyword encodings carry a value.
    pub fn flat_keywords_empty(&self) -> bool {
        [
            &self.hierarchical_subject,
            &self.catalog_sets,
            &self.tags_list,
            &self.last_keyword_xmp,
        ]
        .into_iter()
        .all(is_none_or_empty)
    }
}
