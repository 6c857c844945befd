//! Registration worker consuming the dispatch queue

use crate::authority::{AuthorityError, DoiAuthority};
use crate::config::DispatcherConfig;
use crate::dispatch::DoiCommand;
use registry_storage::{DoiStore, StorageError};
use registry_types::{Doi, DoiData, DoiStatus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// What happened to one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Registered,
    Updated,
    Deleted,
    /// Nothing to do (unknown or already deleted DOI)
    Skipped,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Applies [`DoiCommand`]s against the authority and the DOI store.
///
/// DOI status only moves forward: a DELETED DOI is never registered again.
pub struct RegistrationWorker {
    receiver: mpsc::Receiver<DoiCommand>,
    store: Arc<dyn DoiStore>,
    authority: Arc<dyn DoiAuthority>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RegistrationWorker {
    pub fn new(
        receiver: mpsc::Receiver<DoiCommand>,
        store: Arc<dyn DoiStore>,
        authority: Arc<dyn DoiAuthority>,
        config: &DispatcherConfig,
    ) -> Self {
        Self {
            receiver,
            store,
            authority,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Process commands until every dispatcher is dropped
    pub async fn run(mut self) {
        tracing::info!("Registration worker started");

        while let Some(command) = self.receiver.recv().await {
            let doi = command.doi().clone();
            match self.process(command).await {
                Ok(outcome) => tracing::debug!(doi = %doi, outcome = ?outcome, "DOI command done"),
                Err(e) => tracing::error!(error = %e, doi = %doi, "DOI command failed"),
            }
        }

        tracing::info!("Registration worker stopped");
    }

    pub async fn process(&self, command: DoiCommand) -> Result<CommandOutcome, WorkerError> {
        match command {
            DoiCommand::Register {
                doi,
                metadata,
                target,
            } => {
                let Some(record) = self.store.get_doi(&doi).await? else {
                    tracing::warn!(doi = %doi, "Unknown DOI, registration skipped");
                    return Ok(CommandOutcome::Skipped);
                };

                let outcome = match record.status() {
                    DoiStatus::Deleted => {
                        tracing::warn!(doi = %doi, "DOI is deleted, registration skipped");
                        return Ok(CommandOutcome::Skipped);
                    }
                    DoiStatus::New => {
                        self.with_retries(&doi, || {
                            self.authority.register(&doi, &target, &metadata)
                        })
                        .await?;
                        CommandOutcome::Registered
                    }
                    DoiStatus::Registered => {
                        self.with_retries(&doi, || self.authority.update(&doi, &target, &metadata))
                            .await?;
                        CommandOutcome::Updated
                    }
                };

                self.store
                    .update_doi(
                        &doi,
                        DoiData::new(DoiStatus::Registered, Some(target)),
                        Some(metadata),
                    )
                    .await?;
                tracing::info!(doi = %doi, "DOI registered");
                Ok(outcome)
            }
            DoiCommand::Delete { doi } => {
                let Some(record) = self.store.get_doi(&doi).await? else {
                    tracing::warn!(doi = %doi, "Unknown DOI, deletion skipped");
                    return Ok(CommandOutcome::Skipped);
                };

                match record.status() {
                    DoiStatus::Deleted => return Ok(CommandOutcome::Skipped),
                    // Registered DOIs stay resolvable at the authority
                    DoiStatus::Registered => {}
                    DoiStatus::New => {
                        if self.with_retries(&doi, || self.authority.exists(&doi)).await? {
                            self.with_retries(&doi, || self.authority.delete(&doi))
                                .await?;
                        }
                    }
                }

                let data = DoiData::new(DoiStatus::Deleted, record.data.target.clone());
                self.store.update_doi(&doi, data, None).await?;
                tracing::info!(doi = %doi, "DOI deleted");
                Ok(CommandOutcome::Deleted)
            }
        }
    }

    async fn with_retries<T, F, Fut>(&self, doi: &Doi, mut call: F) -> Result<T, AuthorityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AuthorityError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    tracing::warn!(
                        error = %e,
                        doi = %doi,
                        attempt,
                        max_retries = self.max_retries,
                        "Authority call failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::RecordingAuthority;
    use registry_storage::InMemoryDoiStore;
    use registry_types::DoiKind;
    use url::Url;

    struct Fixture {
        store: Arc<InMemoryDoiStore>,
        authority: Arc<RecordingAuthority>,
        worker: RegistrationWorker,
    }

    fn fixture(max_retries: u32) -> Fixture {
        let store = Arc::new(InMemoryDoiStore::new());
        let authority = Arc::new(RecordingAuthority::new());
        let (_sender, receiver) = mpsc::channel(1);
        let config = DispatcherConfig {
            queue_capacity: 1,
            max_retries,
            retry_delay_ms: 0,
        };
        let worker = RegistrationWorker::new(receiver, store.clone(), authority.clone(), &config);
        Fixture {
            store,
            authority,
            worker,
        }
    }

    fn doi(value: &str) -> Doi {
        Doi::parse(value).unwrap()
    }

    fn register(doi: &Doi) -> DoiCommand {
        DoiCommand::Register {
            doi: doi.clone(),
            metadata: "<resource/>".into(),
            target: Url::parse("https://www.gbif.org/dataset/1").unwrap(),
        }
    }

    #[tokio::test]
    async fn new_doi_is_registered_then_updated() {
        let f = fixture(4);
        let value = doi("10.5072/abc");
        f.store.create_doi(&value, DoiKind::Dataset).await.unwrap();

        let first = f.worker.process(register(&value)).await.unwrap();
        let second = f.worker.process(register(&value)).await.unwrap();

        assert_eq!(first, CommandOutcome::Registered);
        assert_eq!(second, CommandOutcome::Updated);
        let record = f.store.get_doi(&value).await.unwrap().unwrap();
        assert_eq!(record.status(), DoiStatus::Registered);
        assert_eq!(record.metadata.as_deref(), Some("<resource/>"));
        assert!(f.authority.entry(&value).await.is_some());
    }

    #[tokio::test]
    async fn deleted_doi_is_never_registered_again() {
        let f = fixture(4);
        let value = doi("10.5072/gone");
        f.store.create_doi(&value, DoiKind::Dataset).await.unwrap();

        let deleted = f
            .worker
            .process(DoiCommand::Delete { doi: value.clone() })
            .await
            .unwrap();
        let again = f.worker.process(register(&value)).await.unwrap();

        assert_eq!(deleted, CommandOutcome::Deleted);
        assert_eq!(again, CommandOutcome::Skipped);
        assert_eq!(
            f.store.get_doi(&value).await.unwrap().unwrap().status(),
            DoiStatus::Deleted
        );
        assert!(f.authority.entry(&value).await.is_none());
    }

    #[tokio::test]
    async fn unknown_dois_are_skipped() {
        let f = fixture(4);
        let outcome = f.worker.process(register(&doi("10.5072/nope"))).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Skipped);
        assert_eq!(f.authority.calls(), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let f = fixture(4);
        let value = doi("10.5072/flaky");
        f.store.create_doi(&value, DoiKind::Download).await.unwrap();
        f.authority.fail_next(3);

        let outcome = f.worker.process(register(&value)).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Registered);
        assert_eq!(f.authority.calls(), 4);
    }

    #[tokio::test]
    async fn retries_give_up_and_leave_the_doi_new() {
        let f = fixture(2);
        let value = doi("10.5072/down");
        f.store.create_doi(&value, DoiKind::Download).await.unwrap();
        f.authority.fail_next(5);

        let result = f.worker.process(register(&value)).await;
        assert!(matches!(
            result,
            Err(WorkerError::Authority(AuthorityError::Unavailable(_)))
        ));
        assert_eq!(f.authority.calls(), 2);
        assert_eq!(
            f.store.get_doi(&value).await.unwrap().unwrap().status(),
            DoiStatus::New
        );
    }

    #[tokio::test]
    async fn run_drains_the_queue_until_senders_are_gone() {
        let store = Arc::new(InMemoryDoiStore::new());
        let authority = Arc::new(RecordingAuthority::new());
        let (sender, receiver) = mpsc::channel(4);
        let worker = RegistrationWorker::new(
            receiver,
            store.clone(),
            authority.clone(),
            &DispatcherConfig::default(),
        );

        let value = doi("10.5072/queued");
        store.create_doi(&value, DoiKind::Dataset).await.unwrap();
        sender.send(register(&value)).await.unwrap();
        drop(sender);

        worker.run().await;
        assert_eq!(
            store.get_doi(&value).await.unwrap().unwrap().status(),
            DoiStatus::Registered
        );
    }
}
