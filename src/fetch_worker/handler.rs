/// the worker's command loop and the state it owns
///
use anyhow::Result;
use async_channel::{Receiver, Sender};
use async_std::task::{self, JoinHandle};
use log::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::ticker::spawn_ticker;
use crate::error::WorkerError;
use crate::fetch::{Fetch, FetchError};
use crate::worker::{JsonString, Uptime, WorkerState, WorkerStatus, OK};

#[derive(Debug, Clone)]
pub enum Command {
    Tick,
    SeenNumber(i64, Sender<bool>),
    Status(Sender<JsonString>), // request the worker's status
    Unrecognized(String),
    Shutdown,
}

/// requests accepted as json, e.g. `{"seen_number":5}` or `"status"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    SeenNumber(i64),
    Status,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct SeenState {
    id: String,
    name: String,
    fetch: Arc<dyn Fetch>,
    fetch_timeout: Option<Duration>,
    seen: Vec<i64>,
    state: WorkerState,
    uptime: Uptime,
    error_count: u16,
    fetch_count: u64,
    fetch_errors: u64,
    unrecognized_count: u64,
    restarts: u32,
    in_flight: Option<FetchCall>,
}

type FetchCall = JoinHandle<thread::Result<std::result::Result<i64, FetchError>>>;

impl SeenState {
    pub fn new(
        id: &str,
        name: &str,
        fetch: Arc<dyn Fetch>,
        fetch_timeout: Option<Duration>,
    ) -> SeenState {
        SeenState {
            id: id.to_string(),
            name: name.to_string(),
            fetch,
            fetch_timeout,
            seen: vec![],
            state: WorkerState::Idle,
            uptime: Uptime::new(),
            error_count: 0,
            fetch_count: 0,
            fetch_errors: 0,
            unrecognized_count: 0,
            restarts: 0,
            in_flight: None,
        }
    }

    pub fn with_seen(mut self, seen: Vec<i64>) -> SeenState {
        self.seen = seen;
        self
    }

    pub fn with_restarts(mut self, restarts: u32) -> SeenState {
        self.restarts = restarts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seen(&self) -> &[i64] {
        &self.seen
    }

    pub fn seen_number(&self, n: i64) -> bool {
        self.seen.contains(&n)
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            worker_id: self.id.clone(),
            name: self.name.clone(),
            status: OK.to_string(),
            state: self.state,
            uptime: self.uptime.to_string(),
            error_count: self.error_count,
            fetch_count: self.fetch_count,
            fetch_errors: self.fetch_errors,
            unrecognized_count: self.unrecognized_count,
            seen_count: self.seen.len(),
            restarts: self.restarts,
        }
    }

    /// Runs one fetch.  A failed or timed out fetch is `FetchFailed` and leaves the
    /// seen list alone; `FetchCrashed` means the capability panicked.
    pub async fn on_tick(&mut self) -> std::result::Result<i64, WorkerError> {
        self.state = WorkerState::Busy;
        let outcome = self.fetch_once().await;

        match outcome {
            Ok(Ok(n)) => {
                self.state = WorkerState::Idle;
                self.seen.push(n);
                self.fetch_count += 1;
                info!("fetched {}", n);
                Ok(n)
            }
            Ok(Err(_)) => {
                self.state = WorkerState::Idle;
                self.fetch_errors += 1;
                warn!("got an error this time");
                Err(WorkerError::FetchFailed)
            }
            Err(e) => {
                self.state = WorkerState::Broken;
                error!("worker {}: {}", self.name, e);
                Err(e)
            }
        }
    }

    /// Calls the capability off the executor.  At most one call is in flight: a call
    /// that outlived the timeout is kept and awaited again on the next tick instead
    /// of starting another one.  The outer error is a panic inside the capability.
    async fn fetch_once(
        &mut self,
    ) -> std::result::Result<std::result::Result<i64, FetchError>, WorkerError> {
        let mut call = match self.in_flight.take() {
            Some(call) => {
                debug!("worker {}: previous fetch still running", self.name);
                call
            }
            None => {
                let fetch = self.fetch.clone();
                task::spawn_blocking(move || {
                    panic::catch_unwind(AssertUnwindSafe(|| fetch.fetch()))
                })
            }
        };

        let caught = match self.fetch_timeout {
            Some(limit) => match async_std::future::timeout(limit, &mut call).await {
                Ok(caught) => caught,
                Err(_) => {
                    warn!("fetch timed out after {:?}", limit);
                    self.in_flight = Some(call);
                    return Ok(Err(FetchError));
                }
            },
            None => call.await,
        };

        caught.map_err(|payload| WorkerError::FetchCrashed(panic_message(&*payload)))
    }

    pub async fn handle(&mut self, cmd: Command) -> std::result::Result<Flow, WorkerError> {
        match cmd {
            Command::Tick => match self.on_tick().await {
                Ok(_) | Err(WorkerError::FetchFailed) => (),
                Err(e) => return Err(e),
            },
            Command::SeenNumber(n, tx) => {
                let found = self.seen_number(n);
                debug!("seen number {}? {}", n, found);
                if tx.send(found).await.is_err() {
                    self.error_count = self.error_count.saturating_add(1);
                    error!("error returning query response for {}", n);
                }
            }
            Command::Status(tx) => {
                let msg = match serde_json::to_string(&self.status()) {
                    Ok(js) => js,
                    Err(e) => {
                        format!(r#"{}"status":"json parse error: {:?}"{}"#, "{", e, "}\n")
                    }
                };

                debug!("status response: {}", msg);
                if tx.send(msg).await.is_err() {
                    self.error_count = self.error_count.saturating_add(1);
                    error!("error returning status to channel: {:?}", tx);
                }
            }
            Command::Unrecognized(msg) => {
                self.unrecognized_count += 1;
                info!("received unexpected message: {}", msg);
            }
            Command::Shutdown => {
                self.state = WorkerState::Shutdown;
                info!("worker id: {}, state: {:?}", self.id, self.state);
                return Ok(Flow::Stop);
            }
        }

        Ok(Flow::Continue)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

// the handler loop
pub async fn handler(
    mut state: SeenState,
    interval: Duration,
    tx: Sender<Command>,
    rx: Receiver<Command>,
) -> Result<()> {
    let ticker = spawn_ticker(interval, tx);
    let mut result = Ok(());

    // now read and respond to requests
    while let Ok(cmd) = rx.recv().await {
        debug!("worker {} recv cmd: {:?}", state.name(), cmd);
        match state.handle(cmd).await {
            Ok(Flow::Continue) => (),
            Ok(Flow::Stop) => break,
            Err(e) => {
                result = Err(e.into());
                break;
            }
        }
    }

    ticker.cancel().await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Constant, Failing};
    use async_channel::bounded;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, Once};
    use std::thread::ThreadId;

    // records every log line with the thread that emitted it, so parallel tests
    // only look at their own output
    struct CaptureLogger;

    static LOGGER: CaptureLogger = CaptureLogger;
    static INIT: Once = Once::new();
    static RECORDS: Mutex<Vec<(ThreadId, Level, String)>> = Mutex::new(Vec::new());

    impl Log for CaptureLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if let Ok(mut records) = RECORDS.lock() {
                records.push((
                    thread::current().id(),
                    record.level(),
                    record.args().to_string(),
                ));
            }
        }

        fn flush(&self) {}
    }

    fn capture_logs() {
        INIT.call_once(|| {
            let _ = log::set_logger(&LOGGER);
            log::set_max_level(LevelFilter::Trace);
        });
    }

    fn logged(level: Level, text: &str) -> bool {
        let me = thread::current().id();
        RECORDS
            .lock()
            .expect("log records lock")
            .iter()
            .any(|(id, lvl, msg)| *id == me && *lvl == level && msg == text)
    }

    fn state_with(fetch: Arc<dyn Fetch>) -> SeenState {
        SeenState::new("test-worker-id00", "test", fetch, None)
    }

    async fn query(state: &mut SeenState, n: i64) -> bool {
        let (responder, rx) = bounded(1);
        let flow = state
            .handle(Command::SeenNumber(n, responder))
            .await
            .expect("queries never fail");
        assert_eq!(flow, Flow::Continue);
        rx.recv().await.expect("query should be answered")
    }

    #[test]
    fn query_leaves_state_alone() {
        async_std::task::block_on(async move {
            let mut state = state_with(Arc::new(Constant(1))).with_seen(vec![10, 5]);

            assert!(query(&mut state, 10).await);
            assert_eq!(state.seen(), &[10, 5]);

            assert!(!query(&mut state, 7).await);
            assert_eq!(state.seen(), &[10, 5]);
        });
    }

    #[test]
    fn successful_tick() {
        async_std::task::block_on(async move {
            capture_logs();
            let mut state = state_with(Arc::new(Constant(5)));
            assert!(!query(&mut state, 5).await);

            assert_eq!(state.on_tick().await, Ok(5));
            assert!(query(&mut state, 5).await);
            assert!(logged(Level::Info, "fetched 5"));

            // duplicates are kept and do not change the answer
            assert_eq!(state.handle(Command::Tick).await, Ok(Flow::Continue));
            assert_eq!(state.seen(), &[5, 5]);
            assert!(query(&mut state, 5).await);
            assert_eq!(state.status().fetch_count, 2);
        });
    }

    #[test]
    fn failed_tick() {
        async_std::task::block_on(async move {
            capture_logs();
            let mut state = state_with(Arc::new(Failing)).with_seen(vec![10, 5]);

            assert_eq!(state.on_tick().await, Err(WorkerError::FetchFailed));
            assert!(logged(Level::Warn, "got an error this time"));
            assert_eq!(state.seen(), &[10, 5]);

            // the worker keeps going after a failed tick
            assert_eq!(state.handle(Command::Tick).await, Ok(Flow::Continue));
            assert!(query(&mut state, 10).await);
            assert!(!query(&mut state, 7).await);

            let status = state.status();
            assert_eq!(status.fetch_errors, 2);
            assert_eq!(status.fetch_count, 0);
            assert_eq!(status.state, WorkerState::Idle);
        });
    }

    #[test]
    fn crashed_tick() {
        async_std::task::block_on(async move {
            let fetch = || -> std::result::Result<i64, FetchError> { panic!("source exploded") };
            let mut state = state_with(Arc::new(fetch));

            match state.handle(Command::Tick).await {
                Err(WorkerError::FetchCrashed(msg)) => assert_eq!(msg, "source exploded"),
                other => panic!("expected a crash, got {:?}", other),
            }
            assert_eq!(state.status().state, WorkerState::Broken);
            assert!(state.seen().is_empty());
        });
    }

    #[test]
    fn slow_tick_times_out() {
        async_std::task::block_on(async move {
            let fetch = || -> std::result::Result<i64, FetchError> {
                std::thread::sleep(Duration::from_millis(200));
                Ok(3)
            };
            let mut state = SeenState::new(
                "test-worker-id00",
                "slow",
                Arc::new(fetch),
                Some(Duration::from_millis(20)),
            );

            assert_eq!(state.on_tick().await, Err(WorkerError::FetchFailed));
            assert!(state.seen().is_empty());
            assert_eq!(state.status().fetch_errors, 1);
        });
    }

    #[test]
    fn one_fetch_in_flight() {
        async_std::task::block_on(async move {
            let running = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let calls = Arc::new(AtomicUsize::new(0));

            let (r, p, c) = (running.clone(), peak.clone(), calls.clone());
            let fetch = move || -> std::result::Result<i64, FetchError> {
                c.fetch_add(1, Ordering::SeqCst);
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(3)
            };
            let mut state = SeenState::new(
                "test-worker-id00",
                "overlap",
                Arc::new(fetch),
                Some(Duration::from_millis(20)),
            );

            // every tick times out, but only the first one calls the capability
            for _ in 0..5 {
                assert_eq!(state.on_tick().await, Err(WorkerError::FetchFailed));
            }
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(peak.load(Ordering::SeqCst), 1);

            // once the slow call finishes the next tick collects its value
            task::sleep(Duration::from_millis(350)).await;
            assert_eq!(state.on_tick().await, Ok(3));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(peak.load(Ordering::SeqCst), 1);
            assert_eq!(state.seen(), &[3]);
        });
    }

    #[test]
    fn unrecognized_message() {
        async_std::task::block_on(async move {
            capture_logs();
            let mut state = state_with(Arc::new(Constant(1))).with_seen(vec![4]);

            let flow = state
                .handle(Command::Unrecognized("hello".to_string()))
                .await
                .expect("unexpected messages are ignored");
            assert_eq!(flow, Flow::Continue);
            assert_eq!(state.seen(), &[4]);
            assert_eq!(state.status().unrecognized_count, 1);
            assert!(logged(Level::Info, "received unexpected message: hello"));
        });
    }

    #[test]
    fn status_and_shutdown() {
        async_std::task::block_on(async move {
            let mut state = state_with(Arc::new(Constant(1)))
                .with_seen(vec![1, 2, 3])
                .with_restarts(2);

            let (responder, rx) = bounded(1);
            state
                .handle(Command::Status(responder))
                .await
                .expect("status never fails");
            let js = rx.recv().await.expect("status should be answered");
            let status: WorkerStatus = serde_json::from_str(&js).expect("status should parse");

            assert_eq!(status.worker_id, "test-worker-id00");
            assert_eq!(status.name, "test");
            assert_eq!(status.status, OK);
            assert_eq!(status.state, WorkerState::Idle);
            assert_eq!(status.seen_count, 3);
            assert_eq!(status.restarts, 2);

            assert_eq!(state.handle(Command::Shutdown).await, Ok(Flow::Stop));
            assert_eq!(state.status().state, WorkerState::Shutdown);
        });
    }

    #[test]
    fn dropped_responder_counts_an_error() {
        async_std::task::block_on(async move {
            let mut state = state_with(Arc::new(Constant(1)));
            let (responder, rx) = bounded(1);
            drop(rx);

            let flow = state.handle(Command::SeenNumber(1, responder)).await;
            assert_eq!(flow, Ok(Flow::Continue));
            assert_eq!(state.status().error_count, 1);
        });
    }

    #[test]
    fn mailbox_order() {
        async_std::task::block_on(async move {
            let (tx, rx) = bounded(10);
            let (first, first_rx) = bounded(1);
            let (second, second_rx) = bounded(1);

            tx.send(Command::SeenNumber(9, first)).await.unwrap();
            tx.send(Command::Tick).await.unwrap();
            tx.send(Command::SeenNumber(9, second)).await.unwrap();
            tx.send(Command::Shutdown).await.unwrap();

            let state = state_with(Arc::new(Constant(9)));
            let result = handler(state, Duration::from_secs(60), tx, rx).await;
            assert!(result.is_ok());

            assert_eq!(first_rx.recv().await, Ok(false));
            assert_eq!(second_rx.recv().await, Ok(true));
        });
    }

    #[test]
    fn request_json() {
        let req: Request = serde_json::from_str(r#"{"seen_number":5}"#).unwrap();
        assert_eq!(req, Request::SeenNumber(5));
        let req: Request = serde_json::from_str(r#""status""#).unwrap();
        assert_eq!(req, Request::Status);
        assert!(serde_json::from_str::<Request>(r#"{"fetch":1}"#).is_err());
    }
}
