//! Derives structured facts from a file's combined metadata.
//!
//! Resolution misses (unknown country, unparseable date fragments, unnamed
//! regions) are logged and the affected fact is left out; they never stop
//! the remaining facts of the file from being recorded.

use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::domain::{
    is_reserved_keyword, BoundingBox, RoughDate, RoughLocation, DATES_KEYWORD, LOCATIONS_KEYWORD,
};
use crate::error::Result;
use crate::geo;
use crate::metadata::{AreaStruct, KeywordInfo, KeywordNode, MetadataBundle, RegionKind};

/// What [`infer_all`] recorded for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceSummary {
    pub faces: usize,
    pub pets: usize,
    pub tags: usize,
    pub location: Option<RoughLocation>,
    pub date: Option<RoughDate>,
}

impl From<&AreaStruct> for BoundingBox {
    fn from(area: &AreaStruct) -> Self {
        BoundingBox {
            center_x: area.x,
            center_y: area.y,
            width: area.w,
            height: area.h,
        }
    }
}

/// Record every fact the bundle carries against `image_id`. Expects the
/// bundle to have been through [`crate::keywords::combine`].
pub fn infer_all(catalog: &Catalog, image_id: i64, bundle: &MetadataBundle) -> Result<InferenceSummary> {
    let (faces, pets) = apply_regions(catalog, image_id, bundle)?;

    let tags = match &bundle.keyword_info {
        Some(info) => apply_keywords(catalog, image_id, info)?,
        None => 0,
    };

    let location = infer_location(bundle);
    if let Some(location) = &location {
        let location_id = catalog.get_or_create_location(location)?;
        catalog.set_location(image_id, Some(location_id))?;
        info!("Location is {location}");
    }

    let date = bundle.keyword_info.as_ref().and_then(date_from_keywords);
    if let Some(date) = &date {
        let date_id = catalog.get_or_create_date(date)?;
        catalog.set_date(image_id, Some(date_id))?;
        info!("Rough date is {date}");
    }

    Ok(InferenceSummary {
        faces,
        pets,
        tags,
        location,
        date,
    })
}

/// Turn face and pet regions into people, pets and their boxes. Returns the
/// number of face and pet boxes added.
pub fn apply_regions(catalog: &Catalog, image_id: i64, bundle: &MetadataBundle) -> Result<(usize, usize)> {
    let Some(region_info) = &bundle.region_info else {
        debug!("No regions in {}", bundle.source_file.display());
        return Ok((0, 0));
    };

    let mut faces = 0;
    let mut pets = 0;
    for region in &region_info.region_list {
        let name = region.name.trim();
        if name.is_empty() {
            warn!("Skipping {} region with empty name", region.kind);
            continue;
        }
        let description = region.description.as_deref().filter(|d| !d.trim().is_empty());
        let bbox = BoundingBox::from(&region.area);

        match &region.kind {
            RegionKind::Face => {
                let person = catalog.get_or_create_person(name)?;
                if let Some(description) = description {
                    catalog.set_person_description_if_empty(person.id, description)?;
                }
                catalog.add_person_box(image_id, person.id, &bbox)?;
                info!("Found face for person {name}");
                faces += 1;
            }
            RegionKind::Pet => {
                let pet = catalog.get_or_create_pet(name)?;
                if let Some(description) = description {
                    catalog.set_pet_description_if_empty(pet.id, description)?;
                }
                catalog.add_pet_box(image_id, pet.id, &bbox, description)?;
                info!("Found box for pet {name}");
                pets += 1;
            }
            other => warn!("Skipping region {name} of type {other}"),
        }
    }
    Ok((faces, pets))
}

/// Store every non-reserved keyword tree as tags on the image. Returns the
/// number of tags attached.
pub fn apply_keywords(catalog: &Catalog, image_id: i64, keyword_info: &KeywordInfo) -> Result<usize> {
    let mut count = 0;
    for root in &keyword_info.hierarchy {
        if is_reserved_keyword(&root.keyword) {
            continue;
        }
        count += tag_tree(catalog, image_id, root, None)?;
    }
    Ok(count)
}

fn tag_tree(catalog: &Catalog, image_id: i64, node: &KeywordNode, parent: Option<i64>) -> Result<usize> {
    let name = node.keyword.trim();
    if name.is_empty() {
        warn!("Skipping keyword with empty label");
        return Ok(0);
    }

    let tag_id = catalog.get_or_create_tag(name, parent)?;
    catalog.tag_image(tag_id, image_id, node.is_applied())?;

    let mut count = 1;
    for child in &node.children {
        count += tag_tree(catalog, image_id, child, Some(tag_id))?;
    }
    Ok(count)
}

/// Location from the structured fields when a country is present, else from
/// the `Locations` keyword tree. A country that fails to resolve does not
/// fall back to the keywords.
pub fn infer_location(bundle: &MetadataBundle) -> Option<RoughLocation> {
    let has_country = bundle
        .country
        .as_deref()
        .is_some_and(|country| !country.trim().is_empty());
    if has_country {
        return location_from_fields(bundle);
    }
    debug!("No country set, trying keywords");
    bundle.keyword_info.as_ref().and_then(location_from_keywords)
}

/// Resolve the free-text `Country`, `State`, `City` and `Location` fields.
pub fn location_from_fields(bundle: &MetadataBundle) -> Option<RoughLocation> {
    let country = bundle.country.as_deref()?.trim();
    let Some(country_code) = geo::country_code_from_name(country) else {
        warn!("No country code found from {country}");
        return None;
    };
    debug!("Got country {country_code} from {country}");

    let subdivision_code = bundle.state.as_deref().and_then(|state| {
        let code = geo::subdivision_code_from_name(country_code, state);
        if code.is_none() {
            warn!("No subdivision code found from {state}");
        }
        code
    });

    build_location(
        country_code,
        subdivision_code,
        bundle.city.clone(),
        bundle.sub_location.clone(),
    )
}

/// Read a location from a keyword tree shaped like
/// `Locations > Country > Subdivision > City > Sub-location`.
///
/// A second level that is not a subdivision of the country is taken as the
/// city. Only the first child at each level is considered.
pub fn location_from_keywords(keyword_info: &KeywordInfo) -> Option<RoughLocation> {
    let country_node = keyword_info.root(LOCATIONS_KEYWORD)?.first_child()?;
    let Some(country_code) = geo::country_code_from_name(&country_node.keyword) else {
        warn!("No country code found from keyword {}", country_node.keyword);
        return None;
    };

    let mut subdivision_code = None;
    let mut city = None;
    let mut sub_location = None;
    if let Some(second) = country_node.first_child() {
        match geo::subdivision_code_from_name(country_code, &second.keyword) {
            Some(code) => {
                subdivision_code = Some(code);
                if let Some(city_node) = second.first_child() {
                    city = Some(city_node.keyword.clone());
                    sub_location = city_node.first_child().map(|n| n.keyword.clone());
                }
            }
            None => city = Some(second.keyword.clone()),
        }
    }

    build_location(country_code, subdivision_code, city, sub_location)
}

fn build_location(
    country_code: &str,
    subdivision_code: Option<&str>,
    city: Option<String>,
    sub_location: Option<String>,
) -> Option<RoughLocation> {
    match RoughLocation::new(country_code, subdivision_code, city, sub_location) {
        Ok(location) => Some(location),
        Err(e) => {
            warn!("Discarding location: {e}");
            None
        }
    }
}

/// Read a date from a keyword tree shaped like `Dates > 1980 > 12 - December > 25`.
///
/// The year must parse or nothing is recorded. A month is only the number
/// before the first `-`; the day is only consulted once a month was found.
pub fn date_from_keywords(keyword_info: &KeywordInfo) -> Option<RoughDate> {
    let year_node = keyword_info.root(DATES_KEYWORD)?.first_child()?;
    let year: i32 = year_node.keyword.trim().parse().ok()?;

    let month_node = year_node.first_child();
    let month = month_node.and_then(|node| {
        let month = node
            .keyword
            .split('-')
            .next()
            .and_then(|prefix| prefix.trim().parse::<u32>().ok());
        if month.is_none() {
            warn!("Unable to parse month from {}", node.keyword);
        }
        month
    });

    let day = month_node
        .filter(|_| month.is_some())
        .and_then(KeywordNode::first_child)
        .and_then(|node| {
            let day = node.keyword.trim().parse::<u32>().ok();
            if day.is_none() {
                warn!("Unable to parse day from {}", node.keyword);
            }
            day
        });

    let date = RoughDate::from_parts(year, month, day);
    if date.is_none() {
        warn!("{year}-{month:?}-{day:?} is not a valid date");
    }
    date
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewImage;
    use crate::keywords;
    use crate::metadata::{Orientation, RegionInfo, RegionStruct};
    use chrono::NaiveDate;

    fn node(label: &str, children: Vec<KeywordNode>) -> KeywordNode {
        KeywordNode {
            keyword: label.to_string(),
            applied: None,
            children,
        }
    }

    fn leaf(label: &str) -> KeywordNode {
        node(label, vec![])
    }

    fn region(name: &str, kind: RegionKind, description: Option<&str>) -> RegionStruct {
        RegionStruct {
            area: AreaStruct::normalized(0.25, 0.5, 0.1, 0.2),
            name: name.to_string(),
            kind,
            description: description.map(str::to_string),
        }
    }

    fn catalog_with_image() -> (Catalog, i64) {
        let catalog = Catalog::open_in_memory().unwrap();
        let id = catalog
            .insert_image(&NewImage {
                path: "/photos/a.jpg".into(),
                source: None,
                checksum: "abc".into(),
                file_size: 10,
                width: Some(100),
                height: Some(100),
                orientation: Orientation::Horizontal,
                description: None,
            })
            .unwrap();
        (catalog, id)
    }

    // ── Regions ─────────────────────────────────────────────────────

    #[test]
    fn test_regions_create_people_and_pets() {
        let (catalog, id) = catalog_with_image();
        let mut bundle = MetadataBundle::new("/photos/a.jpg");
        bundle.region_info = Some(RegionInfo {
            applied_to_dimensions: None,
            region_list: vec![
                region("Alice", RegionKind::Face, Some("Aunt")),
                region("Rex", RegionKind::Pet, Some("Labrador")),
                region("", RegionKind::Face, None),
                region("Code", RegionKind::BarCode, None),
            ],
        });

        assert_eq!(apply_regions(&catalog, id, &bundle).unwrap(), (1, 1));

        let record = catalog.load_image(id).unwrap();
        assert_eq!(record.faces.len(), 1);
        assert_eq!(record.faces[0].person.name, "Alice");
        assert_eq!(record.faces[0].person.description.as_deref(), Some("Aunt"));
        assert_eq!(record.faces[0].bbox.center_x, 0.25);
        assert_eq!(record.faces[0].bbox.height, 0.2);
        assert_eq!(record.pets[0].pet.name, "Rex");
        assert_eq!(record.pets[0].description.as_deref(), Some("Labrador"));
        assert_eq!(catalog.stats().unwrap().people, 1);
    }

    #[test]
    fn test_person_description_never_overwritten() {
        let (catalog, id) = catalog_with_image();
        let mut bundle = MetadataBundle::new("/photos/a.jpg");
        bundle.region_info = Some(RegionInfo {
            applied_to_dimensions: None,
            region_list: vec![
                region("Alice", RegionKind::Face, Some("First")),
                region("Alice", RegionKind::Face, Some("Second")),
            ],
        });

        apply_regions(&catalog, id, &bundle).unwrap();
        let alice = catalog.get_or_create_person("Alice").unwrap();
        assert_eq!(alice.description.as_deref(), Some("First"));
    }

    // ── Keywords ────────────────────────────────────────────────────

    #[test]
    fn test_keywords_skip_reserved_roots() {
        let (catalog, id) = catalog_with_image();
        let info = KeywordInfo::new(vec![
            node("Events", vec![leaf("Wedding")]),
            node("people", vec![leaf("Alice")]),
            node("Dates", vec![leaf("1980")]),
            node("Locations", vec![leaf("Germany")]),
            leaf("Scanned"),
        ]);

        assert_eq!(apply_keywords(&catalog, id, &info).unwrap(), 3);
        assert_eq!(
            catalog.image_tags(id).unwrap(),
            vec![
                ("Events".to_string(), false),
                ("Events|Wedding".to_string(), true),
                ("Scanned".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_explicit_applied_flag_kept() {
        let (catalog, id) = catalog_with_image();
        let info = KeywordInfo::new(vec![node("Events", vec![leaf("Wedding").with_applied(false)])
            .with_applied(true)]);

        apply_keywords(&catalog, id, &info).unwrap();
        assert_eq!(
            catalog.image_tags(id).unwrap(),
            vec![("Events".to_string(), true), ("Events|Wedding".to_string(), false)]
        );
    }

    // ── Location ────────────────────────────────────────────────────

    #[test]
    fn test_structured_location_with_subdivision() {
        let mut bundle = MetadataBundle::new("/photos/a.jpg");
        bundle.country = Some("United States of America".into());
        bundle.state = Some("California".into());
        bundle.city = Some("San Francisco".into());

        let location = location_from_fields(&bundle).unwrap();
        assert_eq!(location.country_code(), "US");
        assert_eq!(location.subdivision_code(), Some("US-CA"));
        assert_eq!(location.city(), Some("San Francisco"));
        assert_eq!(location.sub_location(), None);
    }

    #[test]
    fn test_structured_location_unknown_subdivision() {
        let mut bundle = MetadataBundle::new("/photos/a.jpg");
        bundle.country = Some("United States of America".into());
        bundle.state = Some("Boston".into());

        let location = location_from_fields(&bundle).unwrap();
        assert_eq!(location.country_code(), "US");
        assert_eq!(location.subdivision_code(), None);
        assert_eq!(location.city(), None);
    }

    #[test]
    fn test_failed_country_does_not_fall_back_to_keywords() {
        let mut bundle = MetadataBundle::new("/photos/a.jpg");
        bundle.country = Some("Atlantis".into());
        bundle.keyword_info = Some(KeywordInfo::new(vec![node("Locations", vec![leaf("Germany")])]));

        assert_eq!(infer_location(&bundle), None);

        bundle.country = None;
        assert_eq!(infer_location(&bundle).unwrap().country_code(), "DE");
    }

    #[test]
    fn test_keyword_location_full_path() {
        let info = KeywordInfo::new(vec![node(
            "Locations",
            vec![
                node(
                    "United States",
                    vec![node("California", vec![node("San Francisco", vec![leaf("Golden Gate Park")])])],
                ),
                leaf("Canada"),
            ],
        )]);

        let location = location_from_keywords(&info).unwrap();
        assert_eq!(location.country_code(), "US");
        assert_eq!(location.subdivision_code(), Some("US-CA"));
        assert_eq!(location.city(), Some("San Francisco"));
        assert_eq!(location.sub_location(), Some("Golden Gate Park"));
    }

    #[test]
    fn test_keyword_location_unknown_subdivision_is_city() {
        let info = KeywordInfo::new(vec![node(
            "Locations",
            vec![node("United States", vec![node("Boston", vec![leaf("Fenway")])])],
        )]);

        let location = location_from_keywords(&info).unwrap();
        assert_eq!(location.subdivision_code(), None);
        assert_eq!(location.city(), Some("Boston"));
        assert_eq!(location.sub_location(), None);
    }

    #[test]
    fn test_keyword_location_in_united_kingdom() {
        let info = KeywordInfo::new(vec![node(
            "Locations",
            vec![node("United Kingdom", vec![node("England", vec![leaf("London")])])],
        )]);

        let location = location_from_keywords(&info).unwrap();
        assert_eq!(location.country_code(), "GB");
        assert_eq!(location.subdivision_code(), Some("GB-ENG"));
        assert_eq!(location.city(), Some("London"));
    }

    #[test]
    fn test_structured_location_accepts_alternate_state_name() {
        let mut bundle = MetadataBundle::new("/photos/a.jpg");
        bundle.country = Some("Spain".into());
        bundle.state = Some("Cataluña".into());
        bundle.city = Some("Barcelona".into());

        let location = location_from_fields(&bundle).unwrap();
        assert_eq!(location.subdivision_code(), Some("ES-CT"));
        assert_eq!(location.subdivision_name(), Some("Catalunya"));
    }

    #[test]
    fn test_keyword_location_requires_country() {
        assert!(location_from_keywords(&KeywordInfo::new(vec![leaf("Locations")])).is_none());
        assert!(location_from_keywords(&KeywordInfo::new(vec![node("Locations", vec![leaf("Atlantis")])])).is_none());
    }

    // ── Date ────────────────────────────────────────────────────────

    fn dates(children: Vec<KeywordNode>) -> KeywordInfo {
        KeywordInfo::new(vec![node("Dates", children)])
    }

    #[test]
    fn test_date_full() {
        let info = dates(vec![node("1980", vec![node("12 - December", vec![leaf("25")])])]);
        let date = date_from_keywords(&info).unwrap();
        assert_eq!(date.date(), NaiveDate::from_ymd_opt(1980, 12, 25).unwrap());
        assert!(date.month_valid());
        assert!(date.day_valid());
    }

    #[test]
    fn test_date_year_only() {
        let date = date_from_keywords(&dates(vec![leaf("1975")])).unwrap();
        assert_eq!(date.date(), NaiveDate::from_ymd_opt(1975, 1, 1).unwrap());
        assert!(!date.month_valid());
        assert!(!date.day_valid());
    }

    #[test]
    fn test_date_bad_month_ignores_day() {
        let info = dates(vec![node("1980", vec![node("Summer", vec![leaf("25")])])]);
        let date = date_from_keywords(&info).unwrap();
        assert_eq!(date.date(), NaiveDate::from_ymd_opt(1980, 1, 1).unwrap());
        assert!(!date.month_valid());
        assert!(!date.day_valid());
    }

    #[test]
    fn test_date_bad_day_keeps_month() {
        let info = dates(vec![node("1980", vec![node("6 - June", vec![leaf("late")])])]);
        let date = date_from_keywords(&info).unwrap();
        assert_eq!(date.date(), NaiveDate::from_ymd_opt(1980, 6, 1).unwrap());
        assert!(date.month_valid());
        assert!(!date.day_valid());
    }

    #[test]
    fn test_date_requires_year() {
        assert!(date_from_keywords(&dates(vec![leaf("Eighties")])).is_none());
        assert!(date_from_keywords(&dates(vec![])).is_none());
        assert!(date_from_keywords(&KeywordInfo::default()).is_none());
    }

    // ── Everything ──────────────────────────────────────────────────

    #[test]
    fn test_infer_all_from_flat_keywords() {
        let (catalog, id) = catalog_with_image();
        let mut bundle = MetadataBundle::new("/photos/a.jpg");
        bundle.hierarchical_subject = Some(vec![
            "Dates|1980|12 - December|25".into(),
            "Locations|Germany|Bayern|München".into(),
            "Events|Christmas".into(),
        ]);
        keywords::combine(&mut bundle);

        let summary = infer_all(&catalog, id, &bundle).unwrap();
        assert_eq!(summary.tags, 2);
        assert_eq!(summary.date, RoughDate::from_parts(1980, Some(12), Some(25)));

        let record = catalog.load_image(id).unwrap();
        let location = record.location.unwrap();
        assert_eq!(location.subdivision_code(), Some("DE-BY"));
        assert_eq!(location.city(), Some("München"));
        assert_eq!(record.date, summary.date);
    }
}
