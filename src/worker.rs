//! The background worker mailings are dispatched to.
//!
//! Jobs go through an unbounded queue. The broker loop answers pings itself and hands mailings
//! to a single processing task, so mailings run one at a time while health checks stay
//! responsive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::mail::attachments::AttachmentArea;
use crate::mail::notes::{DirectoryNotes, ReleaseNotes};
use crate::mail::Resources;
use crate::mailing::runner::run_mailing;
use crate::util::log_err;
use crate::{ErrorKind, Mailer, Result, DB};

/// How long a ping waits for the worker by default.
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

enum Job {
    SendMailing(i32),
    Ping(oneshot::Sender<()>),
}

/// A handle for queueing work. Cheaply clonable.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    queue: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// A dispatcher with no worker behind it; every request fails.
    pub fn disconnected() -> Dispatcher {
        let (queue, _) = mpsc::unbounded_channel();
        Dispatcher { queue }
    }

    /// Queues a mailing for sending.
    pub fn enqueue(&self, mailing_id: i32) -> Result<()> {
        self.queue
            .send(Job::SendMailing(mailing_id))
            .map_err(|_| ErrorKind::BrokerUnavailable("The worker has stopped".to_string()))?;
        info!("Queued mailing {}.", mailing_id);
        Ok(())
    }

    /// Checks that the worker is alive and answering.
    pub async fn ping(&self, timeout: Duration) -> Result<()> {
        let (reply, answer) = oneshot::channel();
        self.queue
            .send(Job::Ping(reply))
            .map_err(|_| ErrorKind::BrokerUnavailable("The worker has stopped".to_string()))?;
        match tokio::time::timeout(timeout, answer).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                Err(ErrorKind::BrokerUnavailable("The worker dropped the ping".to_string()).into())
            }
            Err(_) => Err(ErrorKind::BrokerUnavailable(format!(
                "No answer within {}s",
                timeout.as_secs()
            ))
            .into()),
        }
    }
}

/// Starts the worker on the current runtime.
pub fn spawn(db: DB, settings: Arc<Settings>) -> (Dispatcher, JoinHandle<()>) {
    let notes = Arc::new(DirectoryNotes::new(settings.release_notes_dir.clone()));
    spawn_with_notes(db, settings, notes)
}

/// Starts the worker with a specific release notes source.
pub fn spawn_with_notes(
    db: DB,
    settings: Arc<Settings>,
    notes: Arc<dyn ReleaseNotes>,
) -> (Dispatcher, JoinHandle<()>) {
    let (queue, jobs) = mpsc::unbounded_channel();
    let handle = tokio::spawn(broker(db, settings, notes, jobs));
    (Dispatcher { queue }, handle)
}

async fn broker(
    db: DB,
    settings: Arc<Settings>,
    notes: Arc<dyn ReleaseNotes>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) {
    info!("Worker started.");
    let (work, mailings) = mpsc::unbounded_channel();
    let processor = tokio::spawn(process(db, settings, notes, mailings));

    while let Some(job) = jobs.recv().await {
        match job {
            Job::Ping(reply) => {
                let _ = reply.send(());
            }
            Job::SendMailing(id) => {
                if work.send(id).is_err() {
                    error!("The mailing processor is gone; dropping mailing {}.", id);
                }
            }
        }
    }

    drop(work);
    if let Err(err) = processor.await {
        log_err(&err);
    }
    info!("Worker stopped.");
}

async fn process(
    db: DB,
    settings: Arc<Settings>,
    notes: Arc<dyn ReleaseNotes>,
    mut mailings: mpsc::UnboundedReceiver<i32>,
) {
    let area = Arc::new(AttachmentArea::new(settings.attachments_dir.clone()));
    let (mut succ, mut fail) = (0, 0);

    while let Some(id) = mailings.recv().await {
        let db = db.clone();
        let settings = settings.clone();
        let notes = notes.clone();
        let area = area.clone();
        let result = tokio::task::spawn_blocking(move || {
            let res = Resources {
                settings: &settings,
                area: &area,
                notes: &*notes,
            };
            run_mailing(&db, &res, Mailer::connect, id)
        })
        .await;

        match result {
            Ok(Ok(outcome)) => {
                use log::Level;
                let level = if outcome.failed == 0 {
                    Level::Info
                } else {
                    Level::Error
                };
                log!(
                    level,
                    "Mailing {} finished ({} sent, {} failed).",
                    id,
                    outcome.sent,
                    outcome.failed
                );
                succ += 1;
            }
            Ok(Err(err)) => {
                log_err(&err);
                fail += 1;
            }
            Err(err) => {
                log_err(&err);
                fail += 1;
            }
        }
        debug!("Processed {} mailing(s), {} failed to run.", succ + fail, fail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tempfile::TempDir;
    use url::Url;

    fn settings(dir: &TempDir) -> Arc<Settings> {
        Arc::new(Settings::with_main_config(
            dir.path().to_path_buf(),
            Url::parse("http://localhost:8137/").unwrap(),
            Map::new(),
        ))
    }

    #[tokio::test]
    async fn answers_pings() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _handle) = spawn(DB::in_memory().unwrap(), settings(&dir));
        dispatcher.ping(PING_TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn disconnected_dispatcher_is_unavailable() {
        let dispatcher = Dispatcher::disconnected();
        let err = dispatcher.ping(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::BrokerUnavailable(_)));
        assert!(dispatcher.enqueue(1).is_err());
    }

    #[tokio::test]
    async fn survives_failed_mailings() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _handle) = spawn(DB::in_memory().unwrap(), settings(&dir));
        dispatcher.enqueue(404).unwrap();
        dispatcher.ping(PING_TIMEOUT).await.unwrap();
    }
}
