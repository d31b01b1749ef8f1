use std::fmt;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::geo;
use crate::metadata::Orientation;

/// Root keyword whose subtree encodes a rough date.
pub const DATES_KEYWORD: &str = "Dates";
/// Root keyword whose subtree encodes a rough location.
pub const LOCATIONS_KEYWORD: &str = "Locations";
pub const PEOPLE_KEYWORD: &str = "People";
pub const PETS_KEYWORD: &str = "Pets";

/// Roots with dedicated handling; they never become generic tags.
pub const RESERVED_KEYWORDS: [&str; 4] = [PEOPLE_KEYWORD, PETS_KEYWORD, DATES_KEYWORD, LOCATIONS_KEYWORD];

pub fn is_reserved_keyword(keyword: &str) -> bool {
    RESERVED_KEYWORDS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(keyword))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pet {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Normalized box, center coordinates plus size, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceBox {
    pub id: i64,
    pub person: Person,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PetBox {
    pub id: i64,
    pub pet: Pet,
    pub bbox: BoundingBox,
    pub description: Option<String>,
}

/// Where an image was taken, as precisely as is known. Only the country is
/// required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RoughLocation {
    country_code: String,
    subdivision_code: Option<String>,
    city: Option<String>,
    sub_location: Option<String>,
}

impl RoughLocation {
    /// Validates the codes against the geographic registry. The subdivision,
    /// when given, must belong to the country.
    pub fn new(
        country_code: &str,
        subdivision_code: Option<&str>,
        city: Option<String>,
        sub_location: Option<String>,
    ) -> Result<Self> {
        let country = geo::country_by_code(country_code)
            .ok_or_else(|| Error::InvalidLocation(format!("unknown country code {country_code}")))?;

        let subdivision_code = match subdivision_code {
            Some(code) => {
                let subdivision = geo::subdivision_by_code(code)
                    .ok_or_else(|| Error::InvalidLocation(format!("unknown subdivision code {code}")))?;
                if subdivision.country_alpha2() != country.alpha2 {
                    return Err(Error::InvalidLocation(format!(
                        "subdivision {code} is not in {}",
                        country.alpha2
                    )));
                }
                Some(subdivision.code.to_string())
            }
            None => None,
        };

        Ok(Self {
            country_code: country.alpha2.to_string(),
            subdivision_code,
            city: city.filter(|c| !c.trim().is_empty()),
            sub_location: sub_location.filter(|s| !s.trim().is_empty()),
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn subdivision_code(&self) -> Option<&str> {
        self.subdivision_code.as_deref()
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    pub fn sub_location(&self) -> Option<&str> {
        self.sub_location.as_deref()
    }

    pub fn country_name(&self) -> Option<&'static str> {
        geo::country_by_code(&self.country_code).map(|c| c.name)
    }

    pub fn subdivision_name(&self) -> Option<&'static str> {
        self.subdivision_code.as_deref().and_then(geo::subdivision_name)
    }
}

impl fmt::Display for RoughLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Country: {}", self.country_name().unwrap_or(&self.country_code))?;
        if let Some(state) = self.subdivision_name() {
            write!(f, " - State: {state}")?;
        }
        if let Some(city) = &self.city {
            write!(f, " - City: {city}")?;
        }
        if let Some(sub_location) = &self.sub_location {
            write!(f, " - Location: {sub_location}")?;
        }
        Ok(())
    }
}

/// A date of which only the year, or year and month, may be known. Unknown
/// parts are stored as `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RoughDate {
    date: NaiveDate,
    month_valid: bool,
    day_valid: bool,
}

impl RoughDate {
    pub fn new(date: NaiveDate, month_valid: bool, day_valid: bool) -> Result<Self> {
        if day_valid && !month_valid {
            return Err(Error::InvalidRoughDate);
        }
        Ok(Self {
            date,
            month_valid,
            day_valid,
        })
    }

    /// Build from the known parts; `None` when they do not form a real date.
    pub fn from_parts(year: i32, month: Option<u32>, day: Option<u32>) -> Option<Self> {
        let day = month.and(day);
        let date = NaiveDate::from_ymd_opt(year, month.unwrap_or(1), day.unwrap_or(1))?;
        Some(Self {
            date,
            month_valid: month.is_some(),
            day_valid: day.is_some(),
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn month_valid(&self) -> bool {
        self.month_valid
    }

    pub fn day_valid(&self) -> bool {
        self.day_valid
    }
}

impl fmt::Display for RoughDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.year())?;
        if self.month_valid {
            write!(f, "-{:02}", self.date.month())?;
        } else {
            f.write_str("-MM")?;
        }
        if self.day_valid {
            write!(f, "-{:02}", self.date.day())
        } else {
            f.write_str("-DD")
        }
    }
}

/// Fields recorded when an image is first indexed.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub path: PathBuf,
    pub source: Option<String>,
    pub checksum: String,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub orientation: Orientation,
    pub description: Option<String>,
}

/// An image together with every fact needed to rebuild its file metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub id: i64,
    pub path: PathBuf,
    pub source: Option<String>,
    pub checksum: String,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub orientation: Orientation,
    pub description: Option<String>,
    pub location: Option<RoughLocation>,
    pub date: Option<RoughDate>,
    pub faces: Vec<FaceBox>,
    pub pets: Vec<PetBox>,
    pub is_dirty: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    pub total_images: usize,
    pub dirty_images: usize,
    pub people: usize,
    pub pets: usize,
    pub locations: usize,
    pub dates: usize,
    pub tags: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rough_date_rejects_day_without_month() {
        let date = NaiveDate::from_ymd_opt(1980, 1, 5).unwrap();
        assert!(matches!(RoughDate::new(date, false, true), Err(Error::InvalidRoughDate)));
        assert!(RoughDate::new(date, true, true).is_ok());
        assert!(RoughDate::new(date, false, false).is_ok());
    }

    #[test]
    fn test_rough_date_from_parts() {
        let year_only = RoughDate::from_parts(1980, None, Some(12)).unwrap();
        assert_eq!(year_only.date(), NaiveDate::from_ymd_opt(1980, 1, 1).unwrap());
        assert!(!year_only.month_valid());
        assert!(!year_only.day_valid());

        let full = RoughDate::from_parts(2024, Some(12), Some(25)).unwrap();
        assert!(full.month_valid() && full.day_valid());
        assert_eq!(full.to_string(), "2024-12-25");

        assert!(RoughDate::from_parts(2024, Some(13), None).is_none());
        assert!(RoughDate::from_parts(2023, Some(2), Some(29)).is_none());
    }

    #[test]
    fn test_rough_date_display() {
        assert_eq!(RoughDate::from_parts(1975, None, None).unwrap().to_string(), "1975-MM-DD");
        assert_eq!(RoughDate::from_parts(1975, Some(6), None).unwrap().to_string(), "1975-06-DD");
    }

    #[test]
    fn test_rough_location_validation() {
        let loc = RoughLocation::new("us", Some("US-CA"), Some("San Francisco".into()), None).unwrap();
        assert_eq!(loc.country_code(), "US");
        assert_eq!(loc.subdivision_name(), Some("California"));
        assert_eq!(loc.country_name(), Some("United States"));

        assert!(matches!(
            RoughLocation::new("XX", None, None, None),
            Err(Error::InvalidLocation(_))
        ));
        assert!(matches!(
            RoughLocation::new("DE", Some("US-CA"), None, None),
            Err(Error::InvalidLocation(_))
        ));
    }

    #[test]
    fn test_rough_location_drops_blank_text() {
        let loc = RoughLocation::new("US", None, Some("  ".into()), Some(String::new())).unwrap();
        assert_eq!(loc.city(), None);
        assert_eq!(loc.sub_location(), None);
    }

    #[test]
    fn test_reserved_keywords() {
        assert!(is_reserved_keyword("people"));
        assert!(is_reserved_keyword("DATES"));
        assert!(!is_reserved_keyword("Holidays"));
    }
}
