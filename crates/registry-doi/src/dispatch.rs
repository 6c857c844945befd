//! Fire-and-forget dispatch of registration work.
//!
//! Callers hand over changes and return immediately. Commands travel over a
//! bounded queue to the [`RegistrationWorker`](crate::worker::RegistrationWorker);
//! a full or closed queue is logged and the registry update stands.

use crate::config::RegistrationTargets;
use crate::metadata::{MetadataBuilder, RelatedIdentifier, RelationType};
use registry_types::{Dataset, DerivedDataset, Doi, Download, DownloadStatus, GbifPrefix};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

/// Work item for the registration worker
#[derive(Debug, Clone, PartialEq)]
pub enum DoiCommand {
    Register {
        doi: Doi,
        metadata: String,
        target: Url,
    },
    Delete {
        doi: Doi,
    },
}

impl DoiCommand {
    pub fn doi(&self) -> &Doi {
        match self {
            DoiCommand::Register { doi, .. } | DoiCommand::Delete { doi } => doi,
        }
    }
}

/// An entity after a committed update, with what it replaced
#[derive(Debug, Clone, Copy)]
pub enum EntityChange<'a> {
    Dataset {
        dataset: &'a Dataset,
        previous_doi: Option<&'a Doi>,
    },
    Download {
        download: &'a Download,
        previous_status: Option<DownloadStatus>,
    },
    DerivedDataset {
        derived: &'a DerivedDataset,
    },
}

/// Hand-off point between committed registry state and the authority.
///
/// None of these wait for the authority.
pub trait RegistrationDispatcher: Send + Sync {
    fn schedule_registration(&self, doi: &Doi, metadata: String, target: Url);

    fn notify_changed(&self, change: EntityChange<'_>);

    fn notify_deleted(&self, doi: &Doi);
}

/// [`RegistrationDispatcher`] over a bounded tokio channel
pub struct QueueDispatcher {
    prefix: GbifPrefix,
    metadata: Arc<dyn MetadataBuilder>,
    targets: RegistrationTargets,
    parent_exclude_list: Vec<Uuid>,
    sender: mpsc::Sender<DoiCommand>,
}

impl QueueDispatcher {
    /// Create a dispatcher and the receiving end for the worker
    pub fn new(
        prefix: GbifPrefix,
        metadata: Arc<dyn MetadataBuilder>,
        targets: RegistrationTargets,
        parent_exclude_list: Vec<Uuid>,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<DoiCommand>) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        (
            Self {
                prefix,
                metadata,
                targets,
                parent_exclude_list,
                sender,
            },
            receiver,
        )
    }

    fn send(&self, command: DoiCommand) {
        let doi = command.doi().clone();
        if !self.prefix.owns(&doi) {
            tracing::debug!(doi = %doi, "Skipping non-GBIF DOI");
            return;
        }

        match self.sender.try_send(command) {
            Ok(()) => tracing::debug!(doi = %doi, "Queued DOI command"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::error!(doi = %doi, "Registration queue full, DOI command dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(doi = %doi, "Registration queue closed, DOI command dropped");
            }
        }
    }

    fn dataset_changed(&self, dataset: &Dataset, previous_doi: Option<&Doi>) {
        if let Some(parent) = dataset.parent_dataset_key {
            if self.parent_exclude_list.contains(&parent) {
                tracing::info!(
                    dataset = %dataset.key,
                    parent = %parent,
                    "Dataset parent is excluded from DOI registration"
                );
                return;
            }
        }

        let Some(current) = dataset.doi.as_ref() else {
            return;
        };
        let target = match self.targets.dataset(&dataset.key) {
            Ok(target) => target,
            Err(e) => {
                tracing::error!(error = %e, dataset = %dataset.key, "Invalid dataset target");
                return;
            }
        };
        let changed = previous_doi.filter(|previous| *previous != current);

        if let Some(previous) = changed.filter(|previous| self.prefix.owns(previous)) {
            let related = RelatedIdentifier::new(current.clone(), RelationType::IsPreviousVersionOf);
            let metadata = self.metadata.dataset(dataset, previous, Some(&related));
            self.schedule_registration(previous, metadata, target.clone());
        }

        let related = changed.map(|previous| {
            RelatedIdentifier::new(previous.clone(), RelationType::IsNewVersionOf)
        });
        let metadata = self.metadata.dataset(dataset, current, related.as_ref());
        self.schedule_registration(current, metadata, target);
    }

    fn download_changed(&self, download: &Download, previous_status: Option<DownloadStatus>) {
        let Some(doi) = download.doi.as_ref() else {
            return;
        };
        let newly_available = download.status.is_available()
            && !previous_status.is_some_and(DownloadStatus::has_succeeded);
        if !newly_available {
            return;
        }

        match self.targets.download(&download.key) {
            Ok(target) => {
                let metadata = self.metadata.download(download, doi);
                self.schedule_registration(doi, metadata, target);
            }
            Err(e) => tracing::error!(error = %e, download = %download.key, "Invalid download target"),
        }
    }
}

impl RegistrationDispatcher for QueueDispatcher {
    fn schedule_registration(&self, doi: &Doi, metadata: String, target: Url) {
        self.send(DoiCommand::Register {
            doi: doi.clone(),
            metadata,
            target,
        });
    }

    fn notify_changed(&self, change: EntityChange<'_>) {
        match change {
            EntityChange::Dataset {
                dataset,
                previous_doi,
            } => self.dataset_changed(dataset, previous_doi),
            EntityChange::Download {
                download,
                previous_status,
            } => self.download_changed(download, previous_status),
            EntityChange::DerivedDataset { derived } => {
                if let Some(doi) = derived.doi.as_ref() {
                    let metadata = self.metadata.derived_dataset(derived, doi);
                    self.schedule_registration(doi, metadata, derived.target.clone());
                }
            }
        }
    }

    fn notify_deleted(&self, doi: &Doi) {
        self.send(DoiCommand::Delete { doi: doi.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DataCiteMetadataBuilder;

    fn doi(value: &str) -> Doi {
        Doi::parse(value).unwrap()
    }

    fn dispatcher(exclude: Vec<Uuid>) -> (QueueDispatcher, mpsc::Receiver<DoiCommand>) {
        QueueDispatcher::new(
            GbifPrefix::new("10.5072").unwrap(),
            Arc::new(DataCiteMetadataBuilder::default()),
            RegistrationTargets::from_portal("https://www.gbif.org/").unwrap(),
            exclude,
            16,
        )
    }

    fn drain(receiver: &mut mpsc::Receiver<DoiCommand>) -> Vec<DoiCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = receiver.try_recv() {
            commands.push(command);
        }
        commands
    }

    #[test]
    fn changed_dataset_doi_registers_both_versions() {
        let (dispatcher, mut receiver) = dispatcher(Vec::new());
        let dataset = Dataset::new("Birds", "alice").with_doi(doi("10.5072/new"));
        let previous = doi("10.5072/old");

        dispatcher.notify_changed(EntityChange::Dataset {
            dataset: &dataset,
            previous_doi: Some(&previous),
        });

        let commands = drain(&mut receiver);
        assert_eq!(commands.len(), 2);
        match (&commands[0], &commands[1]) {
            (
                DoiCommand::Register {
                    doi: old,
                    metadata: old_metadata,
                    target,
                },
                DoiCommand::Register {
                    doi: new,
                    metadata: new_metadata,
                    ..
                },
            ) => {
                assert_eq!(old, &previous);
                assert!(old_metadata.contains("IsPreviousVersionOf"));
                assert_eq!(new.suffix(), "new");
                assert!(new_metadata.contains("IsNewVersionOf"));
                assert!(target.as_str().ends_with(&dataset.key.to_string()));
            }
            other => panic!("unexpected commands: {:?}", other),
        }
    }

    #[test]
    fn foreign_dois_are_never_queued() {
        let (dispatcher, mut receiver) = dispatcher(Vec::new());
        let dataset = Dataset::new("Birds", "alice").with_doi(doi("10.9999/theirs"));

        dispatcher.notify_changed(EntityChange::Dataset {
            dataset: &dataset,
            previous_doi: None,
        });
        dispatcher.notify_deleted(&doi("10.9999/theirs"));

        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn excluded_parent_suppresses_registration() {
        let parent = Uuid::new_v4();
        let (dispatcher, mut receiver) = dispatcher(vec![parent]);
        let mut dataset = Dataset::new("Constituent", "alice").with_doi(doi("10.5072/c"));
        dataset.parent_dataset_key = Some(parent);

        dispatcher.notify_changed(EntityChange::Dataset {
            dataset: &dataset,
            previous_doi: None,
        });

        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn downloads_register_once_when_they_become_available() {
        let (dispatcher, mut receiver) = dispatcher(Vec::new());
        let mut download = Download::new("0000001-200101", "carol");
        download.doi = Some(doi("10.5072/dl.abc"));

        dispatcher.notify_changed(EntityChange::Download {
            download: &download,
            previous_status: Some(DownloadStatus::Running),
        });
        assert!(drain(&mut receiver).is_empty());

        download.status = DownloadStatus::Succeeded;
        dispatcher.notify_changed(EntityChange::Download {
            download: &download,
            previous_status: Some(DownloadStatus::Running),
        });
        dispatcher.notify_changed(EntityChange::Download {
            download: &download,
            previous_status: Some(DownloadStatus::Succeeded),
        });

        let commands = drain(&mut receiver);
        assert_eq!(commands.len(), 1);
        assert!(matches!(&commands[0], DoiCommand::Register { target, .. }
            if target.as_str() == "https://www.gbif.org/occurrence/download/0000001-200101"));
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (dispatcher, mut receiver) = QueueDispatcher::new(
            GbifPrefix::new("10.5072").unwrap(),
            Arc::new(DataCiteMetadataBuilder::default()),
            RegistrationTargets::from_portal("https://www.gbif.org/").unwrap(),
            Vec::new(),
            1,
        );

        dispatcher.notify_deleted(&doi("10.5072/a"));
        dispatcher.notify_deleted(&doi("10.5072/b"));

        let commands = drain(&mut receiver);
        assert_eq!(commands, vec![DoiCommand::Delete { doi: doi("10.5072/a") }]);
    }
}
