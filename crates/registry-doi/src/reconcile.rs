//! The decision procedure run on every entity update.
//!
//! Given the submitted DOI, the persisted DOI and the persisted identifier
//! history, decide the new active DOI and the new history. The engine does
//! no I/O: minting is returned as a decision ([`ActiveDoi::Mint`]) and the
//! caller resolves it through the issuer.
//!
//! | submitted | persisted       | outcome                                        |
//! |-----------|-----------------|------------------------------------------------|
//! | none      | GBIF            | keep persisted                                 |
//! | none      | none or foreign | reactivate oldest GBIF DOI from history, else mint; foreign is recorded |
//! | `d`       | other `e`       | `d` active, `e` recorded, `d` removed from history |
//! | `d`       | `d`             | no change                                      |
//! | `d`       | none            | `d` active                                     |

use crate::ledger;
use chrono::{DateTime, Utc};
use registry_types::{AlternateIdentifier, Doi, DownloadStatus, GbifPrefix};

/// The active DOI decided by reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveDoi {
    Assigned(Doi),
    /// No DOI is available; a new GBIF DOI has to be issued
    Mint,
}

impl ActiveDoi {
    pub fn assigned(&self) -> Option<&Doi> {
        match self {
            ActiveDoi::Assigned(doi) => Some(doi),
            ActiveDoi::Mint => None,
        }
    }
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub active: ActiveDoi,
    /// The entity's new identifier history
    pub identifiers: Vec<AlternateIdentifier>,
    /// Previous active DOI, now recorded in history
    pub superseded: Option<Doi>,
    /// DOI promoted back from history
    pub reactivated: Option<Doi>,
}

impl Reconciliation {
    fn unchanged(active: Doi, identifiers: &[AlternateIdentifier]) -> Self {
        Self {
            active: ActiveDoi::Assigned(active),
            identifiers: identifiers.to_vec(),
            superseded: None,
            reactivated: None,
        }
    }
}

/// Inputs of one reconciliation
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    /// DOI as submitted by the caller
    pub submitted: Option<&'a Doi>,
    /// DOI currently persisted for the entity
    pub previous: Option<&'a Doi>,
    /// History currently persisted for the entity
    pub identifiers: &'a [AlternateIdentifier],
    /// GBIF DOIs known to be DELETED; never reactivated
    pub retired: &'a [Doi],
    pub user: &'a str,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    prefix: GbifPrefix,
}

impl ReconciliationEngine {
    pub fn new(prefix: GbifPrefix) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> &GbifPrefix {
        &self.prefix
    }

    pub fn reconcile(&self, input: ReconcileInput<'_>) -> Reconciliation {
        match (input.submitted, input.previous) {
            (None, Some(previous)) if self.prefix.owns(previous) => {
                Reconciliation::unchanged(previous.clone(), input.identifiers)
            }
            (None, previous) => self.reactivate_or_mint(input, previous),
            (Some(submitted), Some(previous)) if submitted != previous => {
                let recorded =
                    ledger::record_superseded(input.identifiers, previous, input.user, input.now);
                Reconciliation {
                    active: ActiveDoi::Assigned(submitted.clone()),
                    identifiers: ledger::remove(&recorded, submitted),
                    superseded: Some(previous.clone()),
                    reactivated: None,
                }
            }
            (Some(submitted), Some(_)) => {
                Reconciliation::unchanged(submitted.clone(), input.identifiers)
            }
            (Some(submitted), None) => Reconciliation {
                active: ActiveDoi::Assigned(submitted.clone()),
                identifiers: ledger::remove(input.identifiers, submitted),
                superseded: None,
                reactivated: None,
            },
        }
    }

    /// Reconcile an entity that must not be given a DOI it did not ask for.
    ///
    /// A missing active DOI is not filled from history, which passes through
    /// in order. [`ActiveDoi::Mint`] then means the entity stays without one.
    pub fn reconcile_without_allocation(&self, input: ReconcileInput<'_>) -> Reconciliation {
        match (input.submitted, input.previous) {
            (None, previous) if !previous.is_some_and(|doi| self.prefix.owns(doi)) => {
                let identifiers = match previous {
                    Some(previous) => ledger::record_superseded(
                        input.identifiers,
                        previous,
                        input.user,
                        input.now,
                    ),
                    None => input.identifiers.to_vec(),
                };
                Reconciliation {
                    active: ActiveDoi::Mint,
                    identifiers,
                    superseded: previous.cloned(),
                    reactivated: None,
                }
            }
            _ => self.reconcile(input),
        }
    }

    fn reactivate_or_mint(
        &self,
        input: ReconcileInput<'_>,
        previous: Option<&Doi>,
    ) -> Reconciliation {
        let reactivated = ledger::find_reactivatable_gbif_doi_excluding(
            input.identifiers,
            &self.prefix,
            input.retired,
        );

        let mut identifiers = match &reactivated {
            Some(doi) => ledger::remove(input.identifiers, doi),
            None => input.identifiers.to_vec(),
        };
        if let Some(previous) = previous {
            identifiers = ledger::record_superseded(&identifiers, previous, input.user, input.now);
        }

        Reconciliation {
            active: reactivated
                .clone()
                .map_or(ActiveDoi::Mint, ActiveDoi::Assigned),
            identifiers,
            superseded: previous.cloned(),
            reactivated,
        }
    }
}

/// Failed downloads must not keep a resolvable DOI
pub fn clears_active_doi(status: DownloadStatus) -> bool {
    status.is_failed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doi(value: &str) -> Doi {
        Doi::parse(value).unwrap()
    }

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::new(GbifPrefix::new("10.5072").unwrap())
    }

    fn input<'a>(
        submitted: Option<&'a Doi>,
        previous: Option<&'a Doi>,
        identifiers: &'a [AlternateIdentifier],
    ) -> ReconcileInput<'a> {
        ReconcileInput {
            submitted,
            previous,
            identifiers,
            retired: &[],
            user: "alice",
            now: Utc::now(),
        }
    }

    fn values(identifiers: &[AlternateIdentifier]) -> Vec<String> {
        identifiers.iter().map(|i| i.identifier.clone()).collect()
    }

    #[test]
    fn first_reconciliation_without_any_doi_mints() {
        let outcome = engine().reconcile(input(None, None, &[]));
        assert_eq!(outcome.active, ActiveDoi::Mint);
        assert!(outcome.identifiers.is_empty());
        assert_eq!(outcome.superseded, None);
    }

    #[test]
    fn gbif_doi_is_kept_when_caller_submits_none() {
        let previous = doi("10.5072/dl.0001");
        let outcome = engine().reconcile(input(None, Some(&previous), &[]));
        assert_eq!(outcome.active, ActiveDoi::Assigned(previous));
        assert!(outcome.identifiers.is_empty());
    }

    #[test]
    fn external_doi_supersedes_gbif_doi() {
        let previous = doi("10.5072/dl.0001");
        let submitted = doi("10.1234/external");
        let outcome = engine().reconcile(input(Some(&submitted), Some(&previous), &[]));

        assert_eq!(outcome.active, ActiveDoi::Assigned(submitted));
        assert_eq!(values(&outcome.identifiers), vec!["10.5072/dl.0001"]);
        assert_eq!(outcome.superseded, Some(previous));
    }

    #[test]
    fn foreign_doi_is_displaced_by_reactivated_gbif_doi() {
        let now = Utc::now();
        let foo = doi("10.5072/foo");
        let bar = doi("10.9999/bar");
        let history = vec![
            AlternateIdentifier::doi(&foo, "alice", now),
            AlternateIdentifier::doi(&bar, "alice", now),
        ];

        let outcome = engine().reconcile(input(None, Some(&bar), &history));

        assert_eq!(outcome.active, ActiveDoi::Assigned(foo.clone()));
        assert_eq!(outcome.reactivated, Some(foo));
        assert_eq!(values(&outcome.identifiers), vec!["10.9999/bar"]);
    }

    #[test]
    fn foreign_doi_without_gbif_history_mints_and_is_recorded() {
        let bar = doi("10.9999/bar");
        let outcome = engine().reconcile(input(None, Some(&bar), &[]));

        assert_eq!(outcome.active, ActiveDoi::Mint);
        assert_eq!(values(&outcome.identifiers), vec!["10.9999/bar"]);
    }

    #[test]
    fn retired_dois_are_not_reactivated() {
        let dead = doi("10.5072/dead");
        let history = vec![AlternateIdentifier::doi(&dead, "alice", Utc::now())];
        let retired = vec![dead];

        let mut request = input(None, None, &history);
        request.retired = &retired;
        let outcome = engine().reconcile(request);

        assert_eq!(outcome.active, ActiveDoi::Mint);
        assert_eq!(outcome.identifiers.len(), 1);
    }

    #[test]
    fn resubmitting_a_historical_doi_moves_it_out_of_history() {
        let now = Utc::now();
        let old = doi("10.5072/old");
        let current = doi("10.5072/current");
        let history = vec![AlternateIdentifier::doi(&old, "alice", now)];

        let outcome = engine().reconcile(input(Some(&old), Some(&current), &history));

        assert_eq!(outcome.active, ActiveDoi::Assigned(old));
        assert_eq!(values(&outcome.identifiers), vec!["10.5072/current"]);
    }

    #[test]
    fn without_allocation_history_is_left_in_order() {
        let gbif = doi("10.5072/dl.abc234");
        let foreign = doi("10.9999/foreign");
        let history = ledger::record_superseded(&[], &gbif, "alice", Utc::now());
        let history = ledger::record_superseded(&history, &foreign, "alice", Utc::now());

        let outcome = engine().reconcile_without_allocation(input(None, None, &history));
        assert_eq!(outcome.active, ActiveDoi::Mint);
        assert_eq!(outcome.identifiers, history);
        assert_eq!(outcome.reactivated, None);

        let outcome =
            engine().reconcile_without_allocation(input(None, Some(&foreign), &history[..1]));
        assert_eq!(outcome.active, ActiveDoi::Mint);
        assert_eq!(values(&outcome.identifiers), values(&history));
        assert_eq!(outcome.superseded, Some(foreign.clone()));

        let kept = engine().reconcile_without_allocation(input(None, Some(&gbif), &[]));
        assert_eq!(kept.active, ActiveDoi::Assigned(gbif));
    }

    #[test]
    fn failed_download_states_clear_the_active_doi() {
        assert!(clears_active_doi(DownloadStatus::Killed));
        assert!(!clears_active_doi(DownloadStatus::Succeeded));
        assert!(!clears_active_doi(DownloadStatus::FileErased));
    }

    fn any_doi() -> impl Strategy<Value = Option<Doi>> {
        prop_oneof![
            Just(None),
            (0u8..4).prop_map(|n| Some(doi(&format!("10.5072/g{}", n)))),
            (0u8..4).prop_map(|n| Some(doi(&format!("10.9999/f{}", n)))),
        ]
    }

    proptest! {
        #[test]
        fn active_doi_never_appears_in_history_and_old_dois_are_kept(
            submissions in proptest::collection::vec(any_doi(), 1..24)
        ) {
            let engine = engine();
            let mut active: Option<Doi> = None;
            let mut history: Vec<AlternateIdentifier> = Vec::new();
            let mut ever_active: Vec<Doi> = Vec::new();
            let mut minted = 0u32;

            for submitted in &submissions {
                let outcome = engine.reconcile(input(submitted.as_ref(), active.as_ref(), &history));
                let next = match outcome.active {
                    ActiveDoi::Assigned(doi) => doi,
                    ActiveDoi::Mint => {
                        minted += 1;
                        doi(&format!("10.5072/m{}", minted))
                    }
                };

                prop_assert!(!ledger::contains(&outcome.identifiers, &next));
                if let Some(previous) = &active {
                    if previous != &next {
                        let count = outcome
                            .identifiers
                            .iter()
                            .filter(|i| i.has_doi_value(previous))
                            .count();
                        prop_assert_eq!(count, 1);
                    }
                }

                if !ever_active.contains(&next) {
                    ever_active.push(next.clone());
                }
                active = Some(next);
                history = outcome.identifiers;

                for old in ever_active.iter().filter(|d| Some(*d) != active.as_ref()) {
                    let count = history.iter().filter(|i| i.has_doi_value(old)).count();
                    prop_assert_eq!(count, 1);
                }
            }
        }

        #[test]
        fn resubmitting_the_active_doi_changes_nothing(
            active in any_doi().prop_filter("needs a DOI", Option::is_some),
            recorded in proptest::collection::vec(any_doi(), 0..6)
        ) {
            let active = active.unwrap();
            let now = Utc::now();
            let history: Vec<AlternateIdentifier> = recorded
                .iter()
                .flatten()
                .filter(|d| *d != &active)
                .map(|d| AlternateIdentifier::doi(d, "alice", now))
                .collect();

            let outcome = engine().reconcile(input(Some(&active), Some(&active), &history));
            prop_assert_eq!(outcome.active, ActiveDoi::Assigned(active));
            prop_assert_eq!(outcome.identifiers, history);
            prop_assert_eq!(outcome.superseded, None);
        }
    }
}
