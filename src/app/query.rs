//! Query resolution against the catalogue
//!
//! [`QueryResolver::resolve`] filters the catalogue by product, regions and
//! years after validating each filter. [`QueryResolver::resolve_complete`] is
//! the stricter form used for downloads: it requires the catalogue to cover the
//! full requested cross-product and fails with a coverage error otherwise.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::app::catalog::{Catalog, CatalogEntry, CatalogView, YearTokens};
use crate::errors::{CatalogError, QueryError, QueryResult};

/// Years of interest for annual products
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearFilter {
    /// Exactly these years
    Years(BTreeSet<i32>),
    /// Every year available for the product
    All,
}

impl YearFilter {
    pub fn years(years: impl IntoIterator<Item = i32>) -> Self {
        YearFilter::Years(years.into_iter().collect())
    }
}

impl FromStr for YearFilter {
    type Err = QueryError;

    /// Parses `all` or a comma-separated list such as `2010,2011`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("all") {
            return Ok(YearFilter::All);
        }

        let years = value
            .split(',')
            .map(|part| part.trim().parse::<i32>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(|_| QueryError::InvalidYearFilter {
                value: s.to_string(),
            })?;
        Ok(YearFilter::Years(years))
    }
}

impl fmt::Display for YearFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearFilter::All => write!(f, "all"),
            YearFilter::Years(years) => {
                let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
                write!(f, "{}", years.join(","))
            }
        }
    }
}

/// Resolves logical queries into catalogue entries
#[derive(Debug, Clone)]
pub struct QueryResolver {
    catalog: Arc<Catalog>,
}

impl QueryResolver {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Filter the catalogue; absent filters keep everything
    ///
    /// A years filter given together with a static product is ignored.
    ///
    /// # Errors
    ///
    /// Usage errors for year tokens in the product name, unknown products,
    /// unknown regions or unknown years; catalogue errors if it cannot be loaded
    pub async fn resolve(
        &self,
        product: Option<&str>,
        regions: Option<&[String]>,
        years: Option<&YearFilter>,
    ) -> QueryResult<Vec<CatalogEntry>> {
        let view = self.catalog.view().await?;
        let regions = regions.map(normalize_regions);
        filter_entries(
            &view,
            self.catalog.year_tokens(),
            product,
            regions.as_deref(),
            years,
        )
    }

    /// Entries for exactly one download request
    ///
    /// Returns one entry per requested region (static products) or per
    /// requested region and year (annual products).
    ///
    /// # Errors
    ///
    /// - Usage errors: no regions, a missing years filter for an annual product,
    ///   a years filter for a static product, plus those of [`Self::resolve`]
    /// - `QueryError::IncompleteCoverage` / `QueryError::MissingRegions` when the
    ///   catalogue does not cover every requested combination
    pub async fn resolve_complete(
        &self,
        product: &str,
        regions: &[String],
        years: Option<&YearFilter>,
    ) -> QueryResult<Vec<CatalogEntry>> {
        let view = self.catalog.view().await?;
        resolve_complete_in(&view, self.catalog.year_tokens(), product, regions, years)
    }
}

/// Upper-cased, de-duplicated region codes in first-seen order
fn normalize_regions(regions: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    regions
        .iter()
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty() && seen.insert(code.clone()))
        .collect()
}

/// Whether `product` is annual; fails for year-carrying or unknown names
fn classify_product(view: &CatalogView, tokens: &YearTokens, product: &str) -> QueryResult<bool> {
    if tokens.looks_like_annual_name(product) {
        return Err(QueryError::ProductContainsYear {
            product: product.to_string(),
        });
    }

    if view.static_products().contains(product) {
        Ok(false)
    } else if view.annual_products().contains(product) {
        Ok(true)
    } else {
        Err(QueryError::UnknownProduct {
            product: product.to_string(),
        })
    }
}

fn validate_regions(view: &CatalogView, regions: &[String]) -> QueryResult<()> {
    let known = view.regions();
    let unknown: Vec<String> = regions
        .iter()
        .filter(|code| !known.contains(*code))
        .cloned()
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(QueryError::UnknownRegions { codes: unknown })
    }
}

fn validate_years(view: &CatalogView, years: &BTreeSet<i32>) -> QueryResult<()> {
    let known = view.annual_years();
    let unknown: Vec<i32> = years.difference(known).copied().collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(QueryError::UnknownYears { years: unknown })
    }
}

fn filter_entries(
    view: &CatalogView,
    tokens: &YearTokens,
    product: Option<&str>,
    regions: Option<&[String]>,
    mut years: Option<&YearFilter>,
) -> QueryResult<Vec<CatalogEntry>> {
    if product.is_none() && regions.is_none() && years.is_none() {
        return Ok(view.entries().to_vec());
    }

    if let Some(product) = product {
        let annual = classify_product(view, tokens, product)?;
        if !annual && years.is_some() {
            info!(
                "Ignoring the years filter since '{}' is a static WorldPop product",
                product
            );
            years = None;
        }
    }

    if let Some(regions) = regions {
        validate_regions(view, regions)?;
    }

    if let Some(YearFilter::Years(requested)) = years {
        validate_years(view, requested)?;
    }

    let region_set: Option<HashSet<&str>> =
        regions.map(|codes| codes.iter().map(String::as_str).collect());

    let entries: Vec<CatalogEntry> = view
        .entries()
        .iter()
        .filter(|e| product.map_or(true, |p| e.product_name == p))
        .filter(|e| {
            region_set
                .as_ref()
                .map_or(true, |set| set.contains(e.country_code_alpha3.as_str()))
        })
        .filter(|e| match years {
            None => true,
            Some(YearFilter::All) => e.is_annual,
            Some(YearFilter::Years(requested)) => e.year.is_some_and(|y| requested.contains(&y)),
        })
        .cloned()
        .collect();

    debug!("Query matched {} catalogue entries", entries.len());
    Ok(entries)
}

fn resolve_complete_in(
    view: &CatalogView,
    tokens: &YearTokens,
    product: &str,
    regions: &[String],
    years: Option<&YearFilter>,
) -> QueryResult<Vec<CatalogEntry>> {
    let regions = normalize_regions(regions);
    if regions.is_empty() {
        return Err(QueryError::NoRegions);
    }

    let annual = classify_product(view, tokens, product)?;
    match (annual, years) {
        (true, None) => {
            return Err(QueryError::YearsRequired {
                product: product.to_string(),
            })
        }
        (false, Some(_)) => {
            return Err(QueryError::YearsNotAllowed {
                product: product.to_string(),
            })
        }
        _ => {}
    }

    let subset = filter_entries(view, tokens, Some(product), Some(&regions), years)?;

    let expected = match years {
        Some(YearFilter::Years(requested)) => regions.len() * requested.len(),
        Some(YearFilter::All) => {
            let present: BTreeSet<i32> = subset.iter().filter_map(|e| e.year).collect();
            regions.len() * present.len()
        }
        None => regions.len(),
    };

    match subset.len().cmp(&expected) {
        Ordering::Equal => Ok(subset),
        Ordering::Less if annual => {
            // every year the product has per region, not just the requested ones
            let mut available: BTreeMap<String, Vec<i32>> =
                regions.iter().map(|r| (r.clone(), Vec::new())).collect();
            for entry in view.entries().iter().filter(|e| e.product_name == product) {
                if let (Some(years), Some(year)) =
                    (available.get_mut(&entry.country_code_alpha3), entry.year)
                {
                    years.push(year);
                }
            }
            for years in available.values_mut() {
                years.sort_unstable();
            }
            Err(QueryError::IncompleteCoverage {
                product: product.to_string(),
                available,
            })
        }
        Ordering::Less => {
            let present: HashSet<&str> = subset
                .iter()
                .map(|e| e.country_code_alpha3.as_str())
                .collect();
            let missing = regions
                .iter()
                .filter(|r| !present.contains(r.as_str()))
                .cloned()
                .collect();
            Err(QueryError::MissingRegions {
                product: product.to_string(),
                regions: missing,
            })
        }
        Ordering::Greater => Err(CatalogError::Integrity {
            reason: format!(
                "query for '{}' matched {} entries, expected {}",
                product,
                subset.len(),
                expected
            ),
        }
        .into()),
    }
}
