//! Pure operations over an entity's identifier history.
//!
//! The history belongs to the entity; these functions take it by reference
//! and return the new list. Values are compared as parsed DOIs, so
//! `doi:10.5072/FOO` and `10.5072/foo` are the same entry.

use chrono::{DateTime, Utc};
use registry_types::{AlternateIdentifier, Doi, GbifPrefix};

/// Append `doi` as a superseded identifier unless the value is already
/// recorded.
pub fn record_superseded(
    identifiers: &[AlternateIdentifier],
    doi: &Doi,
    user: &str,
    now: DateTime<Utc>,
) -> Vec<AlternateIdentifier> {
    let mut next = identifiers.to_vec();
    if !contains(identifiers, doi) {
        next.push(AlternateIdentifier::doi(doi, user, now));
    }
    next
}

/// First DOI-typed entry, in insertion order, that is GBIF-owned.
pub fn find_reactivatable_gbif_doi(
    identifiers: &[AlternateIdentifier],
    prefix: &GbifPrefix,
) -> Option<Doi> {
    find_reactivatable_gbif_doi_excluding(identifiers, prefix, &[])
}

/// As [`find_reactivatable_gbif_doi`], skipping DOIs listed in `retired`.
pub fn find_reactivatable_gbif_doi_excluding(
    identifiers: &[AlternateIdentifier],
    prefix: &GbifPrefix,
    retired: &[Doi],
) -> Option<Doi> {
    identifiers
        .iter()
        .filter_map(AlternateIdentifier::as_doi)
        .find(|doi| prefix.owns(doi) && !retired.contains(doi))
}

/// Remove every entry whose value is `doi`
pub fn remove(identifiers: &[AlternateIdentifier], doi: &Doi) -> Vec<AlternateIdentifier> {
    identifiers
        .iter()
        .filter(|identifier| !identifier.has_doi_value(doi))
        .cloned()
        .collect()
}

pub fn contains(identifiers: &[AlternateIdentifier], doi: &Doi) -> bool {
    identifiers.iter().any(|identifier| identifier.has_doi_value(doi))
}

/// GBIF DOIs recorded in the history, in order
pub fn gbif_dois(identifiers: &[AlternateIdentifier], prefix: &GbifPrefix) -> Vec<Doi> {
    identifiers
        .iter()
        .filter_map(AlternateIdentifier::as_doi)
        .filter(|doi| prefix.owns(doi))
        .collect()
}
