//! Long-running polling service that discovers streams in a partition and
//! drives the runner over each of them.

use crate::backoff::BackoffPolicy;
use crate::runner::{ProjectionRunner, RunnerOptions};
use emt_core::{EventStore, Partition, StreamId};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Page size for the keyset scan over `streams`.
const SCAN_PAGE_SIZE: i64 = 50;

/// Configuration for a [`ProjectionConsumer`].
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Base name used to derive a per-stream subscription id
    /// (`"{consumer_name}:{stream_id}"`), per the checkpoint design.
    pub consumer_name: String,
    /// Partition this consumer drives. Required — a consumer never crosses
    /// partitions.
    pub partition: Partition,
    /// Batch size passed to the runner on each stream.
    pub batch_size: u32,
    /// Sleep between full passes over the partition's streams.
    pub polling_interval: Duration,
}

impl ConsumerConfig {
    /// Build a config for `partition` with a given consumer name, using the
    /// documented defaults (`batchSize=100`, `pollingInterval=1000ms`).
    #[must_use]
    pub fn new(consumer_name: impl Into<String>, partition: Partition) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            partition,
            batch_size: 100,
            polling_interval: Duration::from_millis(1000),
        }
    }
}

async fn scan_stream_ids(
    pool: &PgPool,
    partition: &Partition,
    after: Option<&StreamId>,
) -> Result<Vec<StreamId>, sqlx::Error> {
    let rows = match after {
        Some(cursor) => {
            sqlx::query(
                "SELECT stream_id FROM streams \
                 WHERE partition = $1 AND is_archived = false AND stream_id > $2 \
                 ORDER BY stream_id ASC LIMIT $3",
            )
            .bind(partition.as_str())
            .bind(cursor.as_str())
            .bind(SCAN_PAGE_SIZE)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT stream_id FROM streams \
                 WHERE partition = $1 AND is_archived = false \
                 ORDER BY stream_id ASC LIMIT $2",
            )
            .bind(partition.as_str())
            .bind(SCAN_PAGE_SIZE)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows
        .into_iter()
        .map(|row| StreamId::new(sqlx::Row::get::<String, _>(&row, 0)))
        .collect())
}

/// Long-running service combining runner invocations with stream discovery.
///
/// `start` spawns the loop non-blocking; `stop` signals shutdown and waits for
/// the in-flight batch to finish. The loop honors the stop signal between
/// streams and between events within a stream, but never mid-handler: an
/// interrupted handler is indistinguishable from a crash, and redelivery is
/// safe because handlers are idempotent via `upsert_if_newer`.
pub struct ProjectionConsumer<S> {
    runner: Arc<ProjectionRunner<S>>,
    pool: PgPool,
    config: ConsumerConfig,
    backoff: BackoffPolicy,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: EventStore + Send + Sync + 'static> ProjectionConsumer<S> {
    /// Build a consumer. Call `start` to begin polling.
    #[must_use]
    pub fn new(runner: Arc<ProjectionRunner<S>>, pool: PgPool, config: ConsumerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            runner,
            pool,
            config,
            backoff: BackoffPolicy::new(),
            shutdown_tx,
            shutdown_rx,
            handle: Mutex::new(None),
        }
    }

    /// Spawn the polling loop. Non-blocking; returns once the task is spawned,
    /// not once it exits. Calling `start` twice without an intervening `stop`
    /// replaces the tracked handle but does not stop the earlier task.
    pub async fn start(self: &Arc<Self>) {
        let consumer = Arc::clone(self);
        let task = tokio::spawn(async move { consumer.run().await });
        *self.handle.lock().await = Some(task);
    }

    /// Signal shutdown and wait for the in-flight pass to finish.
    ///
    /// # Panics
    ///
    /// Never — a panicked loop task is logged and treated as already stopped.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "projection consumer task ended with an error");
            }
        }
    }

    fn is_stopping(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    async fn run(&self) {
        info!(
            consumer_name = %self.config.consumer_name,
            partition = %self.config.partition,
            "projection consumer starting"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut attempt = 0u32;

        while !self.is_stopping() {
            match self.drive_one_pass().await {
                Ok(()) => attempt = 0,
                Err(err) => {
                    error!(error = %err, "projection consumer pass failed, backing off");
                    let delay = self.backoff.delay_for_attempt(attempt);
                    attempt = attempt.saturating_add(1);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => break,
                    }
                    continue;
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.polling_interval) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        info!(consumer_name = %self.config.consumer_name, "projection consumer stopped");
    }

    async fn drive_one_pass(&self) -> Result<(), sqlx::Error> {
        let mut after: Option<StreamId> = None;

        loop {
            if self.is_stopping() {
                return Ok(());
            }

            let page = scan_stream_ids(&self.pool, &self.config.partition, after.as_ref()).await?;
            if page.is_empty() {
                return Ok(());
            }

            for stream_id in &page {
                if self.is_stopping() {
                    return Ok(());
                }

                let subscription_id = format!("{}:{}", self.config.consumer_name, stream_id);
                let options = RunnerOptions {
                    partition: self.config.partition.clone(),
                    batch_size: self.config.batch_size,
                };

                if let Err(err) = self
                    .runner
                    .project_events(&subscription_id, stream_id.clone(), options)
                    .await
                {
                    error!(
                        stream_id = %stream_id,
                        error = %err,
                        "projection runner failed for stream, continuing with next stream"
                    );
                } else {
                    debug!(stream_id = %stream_id, "projected stream");
                }
            }

            after = page.last().cloned();
        }
    }
}
