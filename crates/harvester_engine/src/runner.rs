use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::session::{EngineSettings, HarvestReport, HarvestRequest, HarvestSession};
use crate::{HarvestError, RateLimiterRegistry};

pub type RunId = u64;

enum EngineCommand {
    Harvest { run_id: RunId, request: HarvestRequest },
}

/// Completion notice for one harvest run.
#[derive(Debug)]
pub enum HarvestEvent {
    RunCompleted {
        run_id: RunId,
        result: Result<HarvestReport, HarvestError>,
    },
}

/// Handle over a dedicated runtime thread running harvests.
///
/// Runs execute concurrently up to `max_concurrent_sessions`; excess runs
/// queue on the semaphore. All runs share one rate-limiter registry, so
/// concurrent harvests against the same tier respect one pacing budget.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<HarvestEvent>,
    cancels: Arc<Mutex<HashMap<RunId, CancellationToken>>>,
}

impl EngineHandle {
    pub fn new(settings: EngineSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let limiter = Arc::new(RateLimiterRegistry::new(settings.pacing));
        let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_sessions.max(1)));
        let cancels: Arc<Mutex<HashMap<RunId, CancellationToken>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let task_cancels = cancels.clone();

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            while let Ok(command) = cmd_rx.recv() {
                let limiter = limiter.clone();
                let semaphore = semaphore.clone();
                let settings = settings.clone();
                let event_tx = event_tx.clone();
                let cancels = task_cancels.clone();
                runtime.spawn(async move {
                    handle_command(command, limiter, semaphore, settings, cancels, event_tx)
                        .await;
                });
            }
        });

        Self {
            cmd_tx,
            event_rx,
            cancels,
        }
    }

    /// Queues a harvest run. The result arrives as a [`HarvestEvent`].
    pub fn harvest(&self, run_id: RunId, request: HarvestRequest) {
        let _ = self.cmd_tx.send(EngineCommand::Harvest { run_id, request });
    }

    /// Cancels a queued or running harvest. The run returns the records
    /// already admitted and reports itself aborted.
    pub fn cancel(&self, run_id: RunId) {
        if let Some(token) = self.cancels.lock().expect("cancel registry lock").get(&run_id) {
            token.cancel();
        }
    }

    pub fn try_recv(&self) -> Option<HarvestEvent> {
        self.event_rx.try_recv().ok()
    }
}

async fn handle_command(
    command: EngineCommand,
    limiter: Arc<RateLimiterRegistry>,
    semaphore: Arc<Semaphore>,
    settings: EngineSettings,
    cancels: Arc<Mutex<HashMap<RunId, CancellationToken>>>,
    event_tx: mpsc::Sender<HarvestEvent>,
) {
    match command {
        EngineCommand::Harvest { run_id, request } => {
            let token = CancellationToken::new();
            cancels
                .lock()
                .expect("cancel registry lock")
                .insert(run_id, token.clone());

            // The semaphore is never closed, so acquire only fails if it
            // were; treat that as a bug.
            let _permit = semaphore.acquire_owned().await.expect("session semaphore");
            let mut session = HarvestSession::with_cancellation(limiter, settings, token);
            let result = session.run(request).await;

            cancels.lock().expect("cancel registry lock").remove(&run_id);
            let _ = event_tx.send(HarvestEvent::RunCompleted { run_id, result });
        }
    }
}
