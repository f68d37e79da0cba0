//! Raw catalogue parsing and normalization
//!
//! The remote catalogue is a CSV with one row per dataset and country. Parsing
//! classifies each dataset as static or annual from its year token, derives the
//! product name, cleans the notes and checks the integrity rules before a
//! snapshot is handed to the store.

use std::collections::HashSet;

use chrono::Datelike;
use csv::ReaderBuilder;
use regex::{Captures, Regex};
use tracing::debug;

use super::types::{CatalogEntry, CatalogSnapshot};
use crate::constants::catalog;
use crate::errors::{CatalogError, CatalogResult};

/// The current calendar year, upper bound of valid year tokens
pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// MD5 hex digest of a raw catalogue payload
pub fn content_hash(payload: &[u8]) -> String {
    format!("{:x}", md5::compute(payload))
}

/// First whitespace-delimited token of the remote hash payload
pub fn parse_hash_payload(payload: &str) -> Option<String> {
    payload.split_whitespace().next().map(str::to_string)
}

/// Year token recognition for dataset names and notes
#[derive(Debug, Clone)]
pub struct YearTokens {
    name_token: Regex,
    note_mention: Regex,
    last_year: i32,
}

impl YearTokens {
    /// Year tokens valid up to the current year
    pub fn new() -> CatalogResult<Self> {
        Self::with_last_year(current_year())
    }

    /// Year tokens valid up to `last_year`
    pub fn with_last_year(last_year: i32) -> CatalogResult<Self> {
        Ok(Self {
            name_token: Regex::new(r"_(\d{4})")?,
            note_mention: Regex::new(r"(?:\s+in)?\s+(\d{4})\b")?,
            last_year,
        })
    }

    fn in_range(&self, year: i32) -> bool {
        (catalog::FIRST_SUPPORTED_YEAR..=self.last_year).contains(&year)
    }

    /// Year of an annual dataset name
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::InvalidYearToken` unless the name carries exactly
    /// one `_YYYY` token with a year in the supported range
    pub fn extract_year(&self, name: &str) -> CatalogResult<i32> {
        let invalid = || CatalogError::InvalidYearToken {
            name: name.to_string(),
        };

        let mut tokens = self.name_token.captures_iter(name);
        let first = tokens.next().ok_or_else(invalid)?;
        if tokens.next().is_some() {
            return Err(invalid());
        }

        let year: i32 = first[1].parse().map_err(|_| invalid())?;
        if !self.in_range(year) {
            return Err(invalid());
        }
        Ok(year)
    }

    pub fn looks_like_annual_name(&self, name: &str) -> bool {
        self.extract_year(name).is_ok()
    }

    /// Dataset name with its `_YYYY` token removed
    pub fn strip_year(&self, name: &str) -> CatalogResult<String> {
        let year = self.extract_year(name)?;
        Ok(name.replace(&format!("_{}", year), ""))
    }

    /// Remove in-range year mentions (`" in 2020"`, `" 2020"`) from a note
    pub fn strip_years_from_note(&self, note: &str) -> String {
        self.note_mention
            .replace_all(note, |caps: &Captures| {
                let year = caps[1].parse::<i32>().unwrap_or(0);
                if self.in_range(year) {
                    String::new()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }
}

/// Fields of one raw catalogue row, in column order
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    pub id: i64,
    pub country_code_numeric: u16,
    pub country_code_alpha3: &'a str,
    pub country_name: &'a str,
    pub dataset_name: &'a str,
    pub remote_path: &'a str,
    pub notes: &'a str,
}

/// Build one cleaned entry from a raw catalogue row
pub fn normalize_entry(tokens: &YearTokens, raw: RawRecord<'_>) -> CatalogResult<CatalogEntry> {
    let year = tokens.extract_year(raw.dataset_name).ok();
    let (product_name, notes) = match year {
        Some(_) => (
            tokens.strip_year(raw.dataset_name)?,
            tokens.strip_years_from_note(raw.notes),
        ),
        None => (raw.dataset_name.to_string(), raw.notes.to_string()),
    };

    let remote_file_name = raw
        .remote_path
        .rsplit('/')
        .next()
        .unwrap_or(raw.remote_path)
        .to_string();

    Ok(CatalogEntry {
        id: raw.id,
        country_code_numeric: raw.country_code_numeric,
        country_code_alpha3: raw.country_code_alpha3.to_string(),
        country_name: raw.country_name.to_string(),
        dataset_name: raw.dataset_name.to_string(),
        product_name,
        is_annual: year.is_some(),
        year,
        remote_path: raw.remote_path.to_string(),
        remote_file_name,
        notes,
    })
}

/// Parse and normalize a raw catalogue payload
///
/// # Errors
///
/// - `CatalogError::Csv` / `CatalogError::MalformedRecord` for unreadable rows
/// - `CatalogError::DuplicateEntry` / `CatalogError::UnexpectedFormat` when the
///   catalogue breaks an integrity rule
pub fn parse_raw_catalog(payload: &[u8], tokens: &YearTokens) -> CatalogResult<CatalogSnapshot> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(payload);

    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let malformed = |reason: String| CatalogError::MalformedRecord { line, reason };

        if record.len() < catalog::RAW_COLUMN_COUNT - 1 || record.len() > catalog::RAW_COLUMN_COUNT {
            return Err(malformed(format!(
                "expected {} columns, found {}",
                catalog::RAW_COLUMN_COUNT,
                record.len()
            )));
        }

        let field = |index: usize| record.get(index).unwrap_or("");
        let id = field(0)
            .parse::<i64>()
            .map_err(|e| malformed(format!("invalid id '{}': {}", field(0), e)))?;
        let numeric = field(1)
            .parse::<u16>()
            .map_err(|e| malformed(format!("invalid numeric country code '{}': {}", field(1), e)))?;
        let alpha3 = field(2);
        if alpha3.is_empty() {
            return Err(malformed("missing country code".to_string()));
        }

        let entry = normalize_entry(
            tokens,
            RawRecord {
                id,
                country_code_numeric: numeric,
                country_code_alpha3: alpha3,
                country_name: field(3),
                dataset_name: field(4),
                remote_path: field(5),
                notes: field(6),
            },
        )?;

        if !entry.has_raster_extension() {
            return Err(CatalogError::UnexpectedFormat {
                remote_path: entry.remote_path,
            });
        }
        if !seen.insert((entry.dataset_name.clone(), entry.country_code_alpha3.clone())) {
            return Err(CatalogError::DuplicateEntry {
                dataset_name: entry.dataset_name,
                region: entry.country_code_alpha3,
            });
        }

        entries.push(entry);
    }

    debug!("Parsed {} catalogue entries", entries.len());
    Ok(CatalogSnapshot::new(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "idx,Covariate,ISO3,Country,Title,Description,notes\n";

    fn tokens() -> YearTokens {
        YearTokens::with_last_year(2025).unwrap()
    }

    #[test]
    fn test_extract_year() {
        let tokens = tokens();
        assert_eq!(tokens.extract_year("ppp_2020").unwrap(), 2020);
        assert_eq!(tokens.extract_year("ppp_2020_UNadj").unwrap(), 2020);
        assert!(tokens.extract_year("srtm_topo_100m").is_err());
        // two tokens
        assert!(tokens.extract_year("ppp_2010_2020").is_err());
        // out of range
        assert!(tokens.extract_year("ppp_1999").is_err());
        assert!(tokens.extract_year("ppp_2026").is_err());
    }

    #[test]
    fn test_strip_year_round_trips() {
        let tokens = tokens();
        let name = "esaccilc_dst011_100m_2014";
        let stripped = tokens.strip_year(name).unwrap();
        assert_eq!(stripped, "esaccilc_dst011_100m");
        assert!(!tokens.looks_like_annual_name(&stripped));
        assert_eq!(format!("{}_{}", stripped, 2014), name);
    }

    #[test]
    fn test_strip_years_from_note() {
        let tokens = tokens();
        assert_eq!(
            tokens.strip_years_from_note("Estimated total number of people per grid-cell in 2020"),
            "Estimated total number of people per grid-cell"
        );
        assert_eq!(
            tokens.strip_years_from_note("Distance to cultivated area 2014"),
            "Distance to cultivated area"
        );
        assert_eq!(
            tokens.strip_years_from_note("Census baseline of 1990 adjusted"),
            "Census baseline of 1990 adjusted"
        );
    }

    #[test]
    fn test_content_hash_and_hash_payload() {
        assert_eq!(content_hash(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            parse_hash_payload("  abc123  wpgpDatasets.csv\n").as_deref(),
            Some("abc123")
        );
        assert_eq!(parse_hash_payload("   "), None);
    }

    #[test]
    fn test_parse_raw_catalog() {
        let csv = format!(
            "{}{}{}",
            HEADER,
            "1,438,LIE,Liechtenstein,ppp_2010,GIS/Population/Global_2000_2020/2010/LIE/lie_ppp_2010.tif,Estimated people in 2010\n",
            "2,438,LIE,Liechtenstein,srtm_topo_100m,GIS/Covariates/Global_2000_2020/LIE/Topo/lie_srtm_topo_100m.tif,Topography\n",
        );
        let snapshot = parse_raw_catalog(csv.as_bytes(), &tokens()).unwrap();
        assert_eq!(snapshot.len(), 2);

        let annual = &snapshot.entries[0];
        assert!(annual.is_annual);
        assert_eq!(annual.year, Some(2010));
        assert_eq!(annual.product_name, "ppp");
        assert_eq!(annual.remote_file_name, "lie_ppp_2010.tif");
        assert_eq!(annual.notes, "Estimated people");

        let fixed = &snapshot.entries[1];
        assert!(!fixed.is_annual);
        assert_eq!(fixed.year, None);
        assert_eq!(fixed.product_name, fixed.dataset_name);
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        let row = "1,438,LIE,Liechtenstein,ppp_2010,GIS/LIE/lie_ppp_2010.tif,x\n";
        let csv = format!("{}{}{}", HEADER, row, row.replacen('1', "2", 1));
        assert!(matches!(
            parse_raw_catalog(csv.as_bytes(), &tokens()),
            Err(CatalogError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_tif() {
        let csv = format!("{}1,438,LIE,Liechtenstein,ppp_2010,GIS/LIE/lie_ppp_2010.zip,x\n", HEADER);
        assert!(matches!(
            parse_raw_catalog(csv.as_bytes(), &tokens()),
            Err(CatalogError::UnexpectedFormat { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_rows() {
        let csv = format!("{}one,438,LIE,Liechtenstein,ppp_2010,a.tif,x\n", HEADER);
        assert!(matches!(
            parse_raw_catalog(csv.as_bytes(), &tokens()),
            Err(CatalogError::MalformedRecord { line: 2, .. })
        ));
    }
}
