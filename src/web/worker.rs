//! Pooled request worker.
//!
//! A worker runs one request per checkout:
//! `Idle -> Configuring -> InFlight -> Completing -> Idle`.
//! Each worker owns a long-lived background thread, started on its first
//! dispatch and kept across checkouts, so the thread count is bounded by the
//! number of workers the pool ever built. Results travel back to the owning
//! dispatcher as a [`Completion`]. The thread exits when its worker is dropped.

use crate::error::{HydrogenError, Result, TransportError};
use crate::pool::{InstanceId, PooledWorker};
use crate::web::request::{RequestId, RequestParameters, WebCallback};
use crate::web::transport::{Transport, TransportRequest, TransportResponse};
use crossbeam_channel::{SendError, Sender};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No request bound; parked in the pool
    Idle,
    /// Parameters bound, transport call not yet issued
    Configuring,
    /// Transport call outstanding
    InFlight,
    /// Result arrived, callback being delivered
    Completing,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Configuring => "configuring",
            Self::InFlight => "in-flight",
            Self::Completing => "completing",
        };
        f.write_str(name)
    }
}

/// Result of a transport call, addressed to the worker that issued it.
#[derive(Debug)]
pub(crate) struct Completion {
    pub instance: InstanceId,
    pub request_id: RequestId,
    pub result: std::result::Result<TransportResponse, TransportError>,
}

/// One transport call queued for a worker thread.
struct Job {
    transport: Arc<dyn Transport>,
    request: TransportRequest,
    request_id: RequestId,
    instance: InstanceId,
    completions: Sender<Completion>,
}

impl Job {
    fn run(self) {
        let result =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.transport.perform(&self.request)))
                .unwrap_or_else(|_| Err(TransportError::Protocol("transport panicked".into())));
        self.finish(result);
    }

    fn finish(self, result: std::result::Result<TransportResponse, TransportError>) {
        let completion = Completion {
            instance: self.instance,
            request_id: self.request_id,
            result,
        };
        if self.completions.send(completion).is_err() {
            log::debug!("Dispatcher gone before {} completed", self.request_id);
        }
    }
}

fn spawn_runner(slot: usize) -> std::io::Result<Sender<Job>> {
    let (jobs, queue) = crossbeam_channel::unbounded::<Job>();
    std::thread::Builder::new()
        .name(format!("hydrogen-web-{}", slot))
        .spawn(move || {
            for job in queue.iter() {
                job.run();
            }
        })?;
    log::debug!("Started worker thread for slot {}", slot);
    Ok(jobs)
}

pub struct WebWorker {
    state: WorkerState,
    request_id: Option<RequestId>,
    pending: Option<TransportRequest>,
    callback: Option<WebCallback>,
    served: u64,
    runner: Option<Sender<Job>>,
}

impl std::fmt::Debug for WebWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebWorker")
            .field("state", &self.state)
            .field("request_id", &self.request_id)
            .field("served", &self.served)
            .field("runner", &self.runner.is_some())
            .finish()
    }
}

impl Default for WebWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl WebWorker {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Idle,
            request_id: None,
            pending: None,
            callback: None,
            served: 0,
            runner: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    /// Number of requests this worker has completed over its lifetime.
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Binds a request to an idle worker.
    pub fn configure(
        &mut self,
        request_id: RequestId,
        params: RequestParameters,
        user_agent: Option<&str>,
    ) -> Result<()> {
        if self.state != WorkerState::Idle {
            return Err(HydrogenError::WorkerBusy(self.state.to_string()));
        }

        let (request, callback) = params.into_transport(user_agent);
        log::debug!(
            "Worker configured for {} {} {}",
            request_id,
            request.method.as_str(),
            request.uri
        );

        self.request_id = Some(request_id);
        self.pending = Some(request);
        self.callback = callback;
        self.state = WorkerState::Configuring;
        Ok(())
    }

    /// Hands the configured request to the worker's thread.
    ///
    /// The worker is `InFlight` afterwards even if no thread could be
    /// started; in that case a failed completion is queued instead.
    pub(crate) fn dispatch(
        &mut self,
        transport: Arc<dyn Transport>,
        sender: Sender<Completion>,
        instance: InstanceId,
    ) -> Result<()> {
        if self.state != WorkerState::Configuring {
            return Err(HydrogenError::WorkerBusy(self.state.to_string()));
        }
        let (Some(request), Some(request_id)) = (self.pending.take(), self.request_id) else {
            return Err(HydrogenError::Dispatch(
                "worker has no configured request".into(),
            ));
        };

        self.state = WorkerState::InFlight;
        let mut job = Job {
            transport,
            request,
            request_id,
            instance,
            completions: sender,
        };

        if let Some(runner) = self.runner.take() {
            match runner.send(job) {
                Ok(()) => {
                    self.runner = Some(runner);
                    return Ok(());
                }
                Err(SendError(returned)) => {
                    log::warn!("Worker thread for {} exited, restarting", instance);
                    job = returned;
                }
            }
        }

        match spawn_runner(instance.slot()) {
            Ok(runner) => match runner.send(job) {
                Ok(()) => self.runner = Some(runner),
                Err(SendError(job)) => job.finish(Err(TransportError::Io(
                    "worker thread exited before accepting the request".into(),
                ))),
            },
            Err(e) => {
                log::error!("Failed to spawn worker thread for {}: {}", request_id, e);
                job.finish(Err(TransportError::from(e)));
            }
        }

        Ok(())
    }

    /// Moves an in-flight worker to `Completing` and hands out its callback.
    pub(crate) fn begin_completion(&mut self) -> Result<Option<WebCallback>> {
        if self.state != WorkerState::InFlight {
            return Err(HydrogenError::WorkerBusy(self.state.to_string()));
        }
        self.state = WorkerState::Completing;
        self.served += 1;
        Ok(self.callback.take())
    }
}

impl PooledWorker for WebWorker {
    fn reset(&mut self) {
        self.state = WorkerState::Idle;
        self.request_id = None;
        self.pending = None;
        self.callback = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ResourcePool;
    use crossbeam_channel::unbounded;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};
    use std::time::Duration;

    #[derive(Default)]
    struct ThreadRecorder {
        threads: Mutex<Vec<(ThreadId, Option<String>)>>,
    }

    impl Transport for ThreadRecorder {
        fn perform(
            &self,
            _request: &TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            let current = thread::current();
            self.threads
                .lock()
                .unwrap()
                .push((current.id(), current.name().map(str::to_string)));
            Ok(TransportResponse::default())
        }
    }

    struct Echo;

    impl Transport for Echo {
        fn perform(
            &self,
            request: &TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            Ok(TransportResponse {
                status: 200,
                headers: Default::default(),
                body: request.uri.clone(),
            })
        }
    }

    struct Panicky;

    impl Transport for Panicky {
        fn perform(
            &self,
            _request: &TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            panic!("transport blew up");
        }
    }

    fn checked_out() -> (ResourcePool<WebWorker>, InstanceId) {
        let mut pool = ResourcePool::new();
        let id = pool.register(WebWorker::new).unwrap();
        let instance = pool.acquire(id).unwrap();
        (pool, instance)
    }

    #[test]
    fn in_flight_worker_rejects_configure() {
        let (mut pool, instance) = checked_out();
        let (tx, rx) = unbounded();
        let worker = pool.get_mut(instance).unwrap();

        worker
            .configure(RequestId(1), RequestParameters::get("mem://one"), None)
            .unwrap();
        assert!(matches!(
            worker.configure(RequestId(2), RequestParameters::get("mem://two"), None),
            Err(HydrogenError::WorkerBusy(_))
        ));

        worker.dispatch(Arc::new(Echo), tx, instance).unwrap();
        assert_eq!(worker.state(), WorkerState::InFlight);
        assert!(matches!(
            worker.configure(RequestId(3), RequestParameters::get("mem://three"), None),
            Err(HydrogenError::WorkerBusy(_))
        ));

        let completion = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(completion.request_id, RequestId(1));
        assert_eq!(completion.result.unwrap().body, "mem://one");

        let worker = pool.get_mut(instance).unwrap();
        worker.begin_completion().unwrap();
        assert!(worker.configure(RequestId(4), RequestParameters::get("x"), None).is_err());

        pool.release(instance).unwrap();
        let again = pool.acquire(instance.pool()).unwrap();
        let worker = pool.get_mut(again).unwrap();
        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(worker.served(), 1);
        assert!(
            worker
                .configure(RequestId(5), RequestParameters::get("mem://five"), None)
                .is_ok()
        );
    }

    #[test]
    fn dispatch_requires_configuration() {
        let (mut pool, instance) = checked_out();
        let (tx, _rx) = unbounded();
        let worker = pool.get_mut(instance).unwrap();

        assert!(matches!(
            worker.dispatch(Arc::new(Echo), tx, instance),
            Err(HydrogenError::WorkerBusy(_))
        ));
        assert!(worker.begin_completion().is_err());
    }

    #[test]
    fn callback_is_handed_out_once() {
        let (mut pool, instance) = checked_out();
        let (tx, rx) = unbounded();
        let worker = pool.get_mut(instance).unwrap();
        let params = RequestParameters::get("mem://cb").callback(Some(Box::new(
            |_: u16, _: HashMap<String, String>, _: String| {},
        )));

        worker.configure(RequestId(9), params, None).unwrap();
        worker.dispatch(Arc::new(Echo), tx, instance).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(worker.begin_completion().unwrap().is_some());
        assert!(worker.begin_completion().is_err());
    }

    #[test]
    fn panicking_transport_reports_failure() {
        let (mut pool, instance) = checked_out();
        let (tx, rx) = unbounded();
        let worker = pool.get_mut(instance).unwrap();

        worker
            .configure(RequestId(7), RequestParameters::get("mem://boom"), None)
            .unwrap();
        worker
            .dispatch(Arc::new(Panicky), tx.clone(), instance)
            .unwrap();

        let completion = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            completion.result,
            Err(TransportError::Protocol(_))
        ));

        // The thread survives the panic and serves the next checkout.
        worker.begin_completion().unwrap();
        worker.reset();
        worker
            .configure(RequestId(8), RequestParameters::get("mem://after"), None)
            .unwrap();
        worker.dispatch(Arc::new(Echo), tx, instance).unwrap();
        let completion = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(completion.result.unwrap().body, "mem://after");
    }

    #[test]
    fn warm_worker_reuses_its_thread() {
        let (mut pool, first) = checked_out();
        let recorder = Arc::new(ThreadRecorder::default());
        let (tx, rx) = unbounded();

        for (round, uri) in ["mem://a", "mem://b"].into_iter().enumerate() {
            let instance = if round == 0 {
                first
            } else {
                pool.acquire(first.pool()).unwrap()
            };
            assert_eq!(instance.slot(), first.slot());

            let worker = pool.get_mut(instance).unwrap();
            worker
                .configure(RequestId(round as u64), RequestParameters::get(uri), None)
                .unwrap();
            worker
                .dispatch(recorder.clone(), tx.clone(), instance)
                .unwrap();
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
            worker.begin_completion().unwrap();
            pool.release(instance).unwrap();
        }

        let threads = recorder.threads.lock().unwrap().clone();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].0, threads[1].0);
        assert_ne!(threads[0].0, thread::current().id());
        assert_eq!(threads[0].1.as_deref(), Some("hydrogen-web-0"));
    }
}
