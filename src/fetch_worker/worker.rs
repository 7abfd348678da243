use async_channel::{bounded, Sender};
use log::*;
use serde_json::json;
use std::sync::Arc;

use super::handler::{Command, Request};
use super::supervisor::supervise;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::fetch::Fetch;
use crate::worker::{create_worker_id, JsonString, WorkerStatus};

/// A handle to a running fetch worker.
///
/// Handles are cheap to clone; every clone talks to the same mailbox.  The worker
/// keeps ticking until `shutdown` is called or it crashes past its restart limit.
#[derive(Debug, Clone)]
pub struct Worker {
    id: String,
    name: String,
    request_tx: Sender<Command>,
}

impl Worker {
    /// create and start a new worker.
    pub fn start<F: Fetch>(fetch: F, config: WorkerConfig) -> Result<Worker> {
        Worker::start_shared(Arc::new(fetch), config)
    }

    /// start a worker from a capability that is already shared
    pub fn start_shared(fetch: Arc<dyn Fetch>, config: WorkerConfig) -> Result<Worker> {
        config.validate()?;

        let id = create_worker_id();
        let name = config.name.clone().unwrap_or_else(|| id.clone());

        info!(
            "starting up worker, id: {}, name: {}, interval: {}ms",
            id, name, config.interval_ms
        );

        let (request_tx, request_receiver) = bounded(config.queue_capacity);

        // run the supervised handler loop as a background task
        async_std::task::spawn(supervise(
            id.clone(),
            name.clone(),
            config,
            fetch,
            request_tx.clone(),
            request_receiver,
        ));

        let worker = Worker {
            id,
            name,
            request_tx,
        };

        info!("worker created: {:?}", &worker);

        Ok(worker)
    }

    /// return the worker's id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// true once the worker has stopped for good
    pub fn is_closed(&self) -> bool {
        self.request_tx.is_closed()
    }

    /// Asks whether the worker has fetched `n` at some point.  The answer waits
    /// behind whatever is already queued, including a fetch in progress.
    pub async fn seen_number(&self, n: i64) -> Result<bool> {
        let (responder, rx) = bounded(1);
        self.send(Command::SeenNumber(n, responder)).await?;

        rx.recv().await.map_err(|_| WorkerError::Unavailable)
    }

    pub async fn status(&self) -> Result<WorkerStatus> {
        let js = self.status_json().await?;

        serde_json::from_str(&js).map_err(|e| {
            error!("bad status from worker {}: {:?}", self.name, e);
            WorkerError::Unavailable
        })
    }

    pub async fn status_json(&self) -> Result<JsonString> {
        let (responder, rx) = bounded(1);
        self.send(Command::Status(responder)).await?;

        rx.recv().await.map_err(|_| WorkerError::Unavailable)
    }

    /// Handles a json encoded request.  Anything that does not decode is passed to
    /// the worker as an unrecognized message and reported back as an error.
    pub async fn request_json(&self, request: &str) -> Result<JsonString> {
        match serde_json::from_str::<Request>(request) {
            Ok(Request::SeenNumber(n)) => {
                let seen = self.seen_number(n).await?;
                Ok(json!({ "seen": seen }).to_string())
            }
            Ok(Request::Status) => self.status_json().await,
            Ok(Request::Shutdown) => {
                self.shutdown().await?;
                Ok(json!({ "status": "shutdown" }).to_string())
            }
            Err(e) => {
                debug!("undecodable request: {}, {}", request, e);
                self.send(Command::Unrecognized(request.to_string())).await?;
                Err(WorkerError::UnrecognizedMessage(request.to_string()))
            }
        }
    }

    /// stop the worker; requests already queued are answered first
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutdown worker: {}", self.name);
        self.send(Command::Shutdown).await
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.request_tx
            .send(cmd)
            .await
            .map_err(|_| WorkerError::Unavailable)
    }
}
