//! ISO 3166 country and subdivision registry.
//!
//! The tables are compiled into the binary and parsed once on first use into
//! a map from country code to that country's subdivisions. Each row is a
//! code, a display name and any number of alternative names, tab separated.

use std::cmp::Ordering;
use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Minimum similarity (0-100) for a fuzzy country name match.
pub const DEFAULT_PARTIAL_RATIO: f64 = 75.0;

const COUNTRIES_TSV: &str = include_str!("../data/countries.tsv");
const SUBDIVISIONS_TSV: &str = include_str!("../data/subdivisions.tsv");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub alpha2: &'static str,
    pub name: &'static str,
    /// ISO and official names other than `name`.
    pub aliases: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subdivision {
    pub code: &'static str,
    pub name: &'static str,
    /// Names in other official languages.
    pub aliases: Vec<&'static str>,
}

impl Country {
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

impl Subdivision {
    pub fn country_alpha2(&self) -> &'static str {
        self.code.split('-').next().unwrap_or(self.code)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

struct Registry {
    countries: Vec<Country>,
    subdivisions: HashMap<&'static str, Vec<Subdivision>>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let countries = rows(COUNTRIES_TSV)
        .map(|(alpha2, name, aliases)| Country { alpha2, name, aliases })
        .collect();

    let mut subdivisions: HashMap<&'static str, Vec<Subdivision>> = HashMap::new();
    for (code, name, aliases) in rows(SUBDIVISIONS_TSV) {
        let subdivision = Subdivision { code, name, aliases };
        subdivisions
            .entry(subdivision.country_alpha2())
            .or_default()
            .push(subdivision);
    }

    Registry {
        countries,
        subdivisions,
    }
});

fn rows(table: &'static str) -> impl Iterator<Item = (&'static str, &'static str, Vec<&'static str>)> {
    table.lines().filter_map(|line| {
        let mut fields = line.split('\t');
        let code = fields.next()?;
        let name = fields.next()?;
        Some((code, name, fields.collect()))
    })
}

/// Lowercase, replace anything that is not alphanumeric with a space, and
/// collapse runs of whitespace.
fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_words(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && format!(" {haystack} ").contains(&format!(" {needle} "))
}

pub fn countries() -> &'static [Country] {
    &REGISTRY.countries
}

pub fn country_by_code(alpha2: &str) -> Option<&'static Country> {
    REGISTRY
        .countries
        .iter()
        .find(|c| c.alpha2.eq_ignore_ascii_case(alpha2))
}

pub fn is_valid_country_code(alpha2: &str) -> bool {
    country_by_code(alpha2).is_some()
}

pub fn country_by_exact_name(name: &str) -> Option<&'static Country> {
    let name = name.trim();
    REGISTRY
        .countries
        .iter()
        .find(|c| c.names().any(|candidate| candidate.eq_ignore_ascii_case(name)))
}

/// Countries loosely matching `name`, best candidates first.
///
/// Countries sharing whole words with `name` come first: a name contained
/// in the query ("Germany, Bavaria") or the query contained in a name
/// ("New Guinea"). They are ranked by how similar the two are, so a short
/// name hidden inside the query does not beat a closer match. Then come
/// countries whose similarity reaches `ratio` (0-100), most similar first.
pub fn countries_by_partial_name(name: &str, ratio: f64) -> Vec<&'static Country> {
    let query = normalize(name);
    if query.is_empty() {
        return Vec::new();
    }

    let mut overlapping: Vec<(f64, &'static Country)> = Vec::new();
    let mut similar: Vec<(f64, &'static Country)> = Vec::new();
    for country in &REGISTRY.countries {
        let mut best_overlap: Option<f64> = None;
        let mut best_similarity = 0.0_f64;
        for candidate in country.names().map(normalize) {
            let similarity = strsim::normalized_levenshtein(&query, &candidate);
            best_similarity = best_similarity.max(similarity);
            if contains_words(&query, &candidate) || contains_words(&candidate, &query) {
                best_overlap = Some(best_overlap.map_or(similarity, |best| best.max(similarity)));
            }
        }
        match best_overlap {
            Some(score) => overlapping.push((score, country)),
            None if best_similarity * 100.0 >= ratio => similar.push((best_similarity, country)),
            None => {}
        }
    }
    overlapping.sort_by(by_score);
    similar.sort_by(by_score);

    overlapping
        .into_iter()
        .chain(similar)
        .map(|(_, country)| country)
        .collect()
}

fn by_score(a: &(f64, &Country), b: &(f64, &Country)) -> Ordering {
    b.0.total_cmp(&a.0)
}

/// Resolve a free-text country name: exact match first, then the best
/// partial match.
pub fn country_code_from_name(name: &str) -> Option<&'static str> {
    country_by_exact_name(name)
        .or_else(|| {
            countries_by_partial_name(name, DEFAULT_PARTIAL_RATIO)
                .into_iter()
                .next()
        })
        .map(|c| c.alpha2)
}

pub fn subdivisions_of(alpha2: &str) -> &'static [Subdivision] {
    REGISTRY
        .subdivisions
        .get(alpha2.to_ascii_uppercase().as_str())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

pub fn subdivision_by_code(code: &str) -> Option<&'static Subdivision> {
    let country = code.split_once('-')?.0;
    subdivisions_of(country)
        .iter()
        .find(|s| s.code.eq_ignore_ascii_case(code))
}

pub fn is_valid_subdivision_code(code: &str) -> bool {
    subdivision_by_code(code).is_some()
}

pub fn subdivision_name(code: &str) -> Option<&'static str> {
    subdivision_by_code(code).map(|s| s.name)
}

/// Resolve a subdivision name within one country by exact (case-insensitive)
/// name in any of its languages. `DC` is accepted for the District of
/// Columbia.
pub fn subdivision_code_from_name(alpha2: &str, name: &str) -> Option<&'static str> {
    let name = name.trim();
    let name = if name.eq_ignore_ascii_case("dc") {
        "District of Columbia"
    } else {
        name
    };
    let name = name.to_lowercase();
    subdivisions_of(alpha2)
        .iter()
        .find(|s| s.names().any(|candidate| candidate.to_lowercase() == name))
        .map(|s| s.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_load() {
        assert!(countries().len() > 200);
        assert_eq!(country_by_code("us").unwrap().name, "United States");
        assert!(!subdivisions_of("US").is_empty());
        assert!(subdivisions_of("ZZ").is_empty());
    }

    #[test]
    fn test_exact_country_name() {
        assert_eq!(country_by_exact_name("germany").unwrap().alpha2, "DE");
        assert!(country_by_exact_name("Germania").is_none());
    }

    #[test]
    fn test_partial_country_name() {
        assert_eq!(country_code_from_name("United States of America"), Some("US"));
        assert_eq!(country_code_from_name("Untied States"), Some("US"));
        assert_eq!(country_code_from_name("Papua New Guinea"), Some("PG"));
        assert_eq!(country_code_from_name("Atlantis"), None);
        assert_eq!(country_code_from_name(""), None);
    }

    #[test]
    fn test_subdivision_lookup() {
        assert_eq!(subdivision_code_from_name("US", "California"), Some("US-CA"));
        assert_eq!(subdivision_code_from_name("us", "dc"), Some("US-DC"));
        assert_eq!(subdivision_code_from_name("US", "Boston"), None);
        assert_eq!(subdivision_code_from_name("DE", "California"), None);
        assert_eq!(subdivision_name("US-NY"), Some("New York"));
    }

    #[test]
    fn test_partial_match_prefers_closest_name() {
        assert_eq!(country_code_from_name("New Guinea"), Some("PG"));
        assert_eq!(country_code_from_name("Bavaria, Germany"), Some("DE"));
        let ranked = countries_by_partial_name("Guinea", DEFAULT_PARTIAL_RATIO);
        assert_eq!(ranked[0].alpha2, "GN");
    }

    #[test]
    fn test_alias_names() {
        assert_eq!(country_by_exact_name("Korea, Republic of").unwrap().alpha2, "KR");
        assert_eq!(country_code_from_name("United Kingdom of Great Britain and Northern Ireland"), Some("GB"));
        assert_eq!(subdivision_code_from_name("ES", "Cataluña"), Some("ES-CT"));
        assert_eq!(subdivision_code_from_name("ES", "Catalunya"), Some("ES-CT"));
        assert_eq!(subdivision_name("ES-CT"), Some("Catalunya"));
    }

    #[test]
    fn test_subdivisions_of_large_countries() {
        for (country, name, code) in [
            ("GB", "England", "GB-ENG"),
            ("FR", "Normandie", "FR-NOR"),
            ("IT", "Toscana", "IT-52"),
            ("JP", "Tokyo", "JP-13"),
            ("IN", "Kerala", "IN-KL"),
            ("CN", "Beijing Shi", "CN-BJ"),
            ("RU", "Moskva", "RU-MOW"),
            ("PH", "National Capital Region", "PH-00"),
        ] {
            assert_eq!(subdivision_code_from_name(country, name), Some(code), "{name}");
        }
        assert!(subdivisions_of("GB").len() > 200);
    }

    #[test]
    fn test_code_validity() {
        assert!(is_valid_country_code("GE"));
        assert!(!is_valid_country_code("XX"));
        assert!(is_valid_subdivision_code("GE-TB"));
        assert!(!is_valid_subdivision_code("GE-XX"));
        assert!(!is_valid_subdivision_code("GETB"));
    }
}
