use async_channel::{Receiver, Sender};
use hashbrown::HashMap;
use log::*;
use std::sync::Arc;

use super::handler::{handler, Command, SeenState};
use super::worker::Worker;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::fetch::Fetch;
use crate::worker::WorkerStatus;

/// Runs a worker's handler and restarts it after a crash.
///
/// A restarted worker begins with an empty seen list but keeps the mailbox, so
/// requests queued during the crash are still answered.  Once the restart limit
/// is used up, or after a clean shutdown, the mailbox is closed and drained so
/// anyone still waiting on a reply gets `Unavailable`.
pub(crate) async fn supervise(
    id: String,
    name: String,
    config: WorkerConfig,
    fetch: Arc<dyn Fetch>,
    tx: Sender<Command>,
    rx: Receiver<Command>,
) {
    let mut restarts = 0u32;

    loop {
        let state = SeenState::new(&id, &name, fetch.clone(), config.fetch_timeout())
            .with_restarts(restarts);

        match handler(state, config.interval(), tx.clone(), rx.clone()).await {
            Ok(()) => {
                info!("worker handler exit for worker: {}", name);
                break;
            }
            Err(e) if restarts < config.max_restarts => {
                restarts += 1;
                warn!(
                    "restarting worker: {} after error: {} ({} of {})",
                    name, e, restarts, config.max_restarts
                );
            }
            Err(e) => {
                error!("worker: {} exit with error: {:?}, no restarts left", name, e);
                break;
            }
        }
    }

    rx.close();
    while let Ok(cmd) = rx.try_recv() {
        debug!("worker: {} dropped {:?}", name, cmd);
    }
}

/// a named pool of fetch workers
#[derive(Debug, Default)]
pub struct Supervisor {
    workers: HashMap<String, Worker>,
}

impl Supervisor {
    pub fn new() -> Supervisor {
        Supervisor {
            workers: HashMap::new(),
        }
    }

    /// start a worker and keep its handle under the worker's name
    pub fn start<F: Fetch>(&mut self, fetch: F, config: WorkerConfig) -> Result<Worker> {
        self.start_shared(Arc::new(fetch), config)
    }

    pub fn start_shared(
        &mut self,
        fetch: Arc<dyn Fetch>,
        config: WorkerConfig,
    ) -> Result<Worker> {
        if let Some(name) = &config.name {
            if self.workers.contains_key(name) {
                return Err(WorkerError::DuplicateName(name.to_string()));
            }
        }

        let worker = Worker::start_shared(fetch, config)?;
        self.workers.insert(worker.name().to_string(), worker.clone());

        Ok(worker)
    }

    pub fn worker(&self, name: &str) -> Option<&Worker> {
        self.workers.get(name)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// status for each worker, sorted by name; stopped workers report as down
    pub async fn status(&self) -> Vec<WorkerStatus> {
        let mut list = Vec::with_capacity(self.workers.len());

        for worker in self.workers.values() {
            let status = match worker.status().await {
                Ok(status) => status,
                Err(e) => {
                    warn!("no status from worker: {}, {}", worker.name(), e);
                    WorkerStatus::down(worker.id(), worker.name())
                }
            };
            list.push(status);
        }

        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// stop every worker and forget them; the first unexpected error is returned
    /// after all workers have been asked to stop
    pub async fn shutdown(&mut self) -> Result<()> {
        let mut result = Ok(());

        for (name, worker) in self.workers.drain() {
            match worker.shutdown().await {
                Ok(()) => (),
                Err(WorkerError::Unavailable) => debug!("worker: {} already stopped", name),
                Err(e) => {
                    error!("error shutting down worker: {}, {}", name, e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }

        result
    }
}
