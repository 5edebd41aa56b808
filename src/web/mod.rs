//! Pool-backed web request dispatching.
//!
//! [`WebPool`] hides a [`ResourcePool`] of [`WebWorker`]s behind verb-style
//! methods. Every call checks out a worker, binds the request to it and
//! starts the transport on a background thread. Results queue up until the
//! host calls [`WebPool::poll`], which runs each callback on the polling
//! thread and then returns the worker to the pool.
//!
//! ```no_run
//! use hydrogen::web::WebPool;
//! use hydrogen::WebPoolDesc;
//!
//! let web = WebPool::new(WebPoolDesc::default())?;
//! web.get("https://example.com/", |status, _headers, body| {
//!     println!("{} ({} bytes)", status, body.len());
//! })?;
//!
//! // Once per frame:
//! for event in web.poll() {
//!     println!("{:?}", event);
//! }
//! # Ok::<(), hydrogen::HydrogenError>(())
//! ```

mod request;
mod transport;
mod worker;

pub use request::{
    FormBinaryData, Method, RequestBody, RequestId, RequestParameters, WebCallback,
    encode_multipart,
};
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
pub use worker::{WebWorker, WorkerState};

use crate::config::WebPoolDesc;
use crate::error::{HydrogenError, Result};
use crate::events::HydrogenEvent;
use crate::pool::{InstanceId, PoolId, PoolStats, ResourcePool};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use worker::Completion;

/// Status reported to callbacks when no HTTP response was obtained.
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

pub struct WebPool {
    desc: WebPoolDesc,
    pool: Mutex<ResourcePool<WebWorker>>,
    pool_id: PoolId,
    transport: Arc<dyn Transport>,
    completion_sender: Sender<Completion>,
    completion_receiver: Receiver<Completion>,
    next_request_id: AtomicU64,
}

impl WebPool {
    /// Creates a dispatcher that talks HTTP through [`HttpTransport`].
    pub fn new(desc: WebPoolDesc) -> Result<Self> {
        let transport = Arc::new(
            HttpTransport::new(desc.request_timeout).body_limit(desc.max_response_bytes),
        );
        Self::with_transport(desc, transport)
    }

    pub fn with_transport(desc: WebPoolDesc, transport: Arc<dyn Transport>) -> Result<Self> {
        let mut pool = ResourcePool::new();
        let pool_id = pool.register_with(WebWorker::new, desc.pool_desc())?;
        let (completion_sender, completion_receiver) = crossbeam_channel::unbounded();

        log::info!(
            "Web pool ready (workers: {}, max: {:?}, persistent: {})",
            desc.prewarm_workers,
            desc.max_workers,
            desc.persistent
        );

        Ok(Self {
            desc,
            pool: Mutex::new(pool),
            pool_id,
            transport,
            completion_sender,
            completion_receiver,
            next_request_id: AtomicU64::new(0),
        })
    }

    pub fn desc(&self) -> &WebPoolDesc {
        &self.desc
    }

    pub fn is_persistent(&self) -> bool {
        self.desc.persistent
    }

    /// Pool id of the worker template registered at construction.
    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn get<F>(&self, uri: &str, callback: F) -> Result<RequestId>
    where
        F: FnOnce(u16, HashMap<String, String>, String) + Send + 'static,
    {
        self.get_with_cookie(uri, None, callback)
    }

    pub fn get_with_cookie<F>(
        &self,
        uri: &str,
        cookie: Option<&str>,
        callback: F,
    ) -> Result<RequestId>
    where
        F: FnOnce(u16, HashMap<String, String>, String) + Send + 'static,
    {
        let callback: WebCallback = Box::new(callback);
        let params = RequestParameters::get(uri)
            .cookie(cookie)
            .callback(Some(callback));
        self.submit(params)
    }

    /// Fire-and-forget POST.
    pub fn post(
        &self,
        uri: &str,
        content_type: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<RequestId> {
        self.post_with(uri, content_type, payload, None, None)
    }

    pub fn post_with(
        &self,
        uri: &str,
        content_type: &str,
        payload: impl Into<Vec<u8>>,
        cookie: Option<&str>,
        callback: Option<WebCallback>,
    ) -> Result<RequestId> {
        let params = RequestParameters::post(uri, content_type, payload)
            .cookie(cookie)
            .callback(callback);
        self.submit(params)
    }

    /// Fire-and-forget multipart form POST with string fields only.
    pub fn form(&self, uri: &str, fields: &HashMap<String, String>) -> Result<RequestId> {
        self.form_with(uri, fields, &[], None, None)
    }

    pub fn form_with(
        &self,
        uri: &str,
        fields: &HashMap<String, String>,
        binary: &[FormBinaryData],
        cookie: Option<&str>,
        callback: Option<WebCallback>,
    ) -> Result<RequestId> {
        let params = RequestParameters::form(uri, fields, binary)
            .cookie(cookie)
            .callback(callback);
        self.submit(params)
    }

    /// Checks out a worker and starts the request on it.
    pub fn submit(&self, params: RequestParameters) -> Result<RequestId> {
        let request_id = RequestId(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        let mut pool = self.lock_pool()?;
        let instance = pool.acquire(self.pool_id)?;

        let started = pool.get_mut(instance).and_then(|worker| {
            worker.configure(request_id, params, self.desc.user_agent.as_deref())?;
            worker.dispatch(
                self.transport.clone(),
                self.completion_sender.clone(),
                instance,
            )
        });

        if let Err(e) = started {
            log::error!("Failed to start {} on {}: {}", request_id, instance, e);
            return Err(abandon_start(&mut pool, instance, e));
        }

        Ok(request_id)
    }

    /// Delivers every completion that has already arrived.
    ///
    /// Callbacks run on the calling thread, one at a time, without the pool
    /// lock held, so they may submit further requests.
    pub fn poll(&self) -> Vec<HydrogenEvent> {
        let completions: Vec<Completion> = self.completion_receiver.try_iter().collect();
        completions
            .into_iter()
            .map(|completion| self.complete(completion))
            .collect()
    }

    /// Waits up to `timeout` for the first completion, then drains like [`poll`](Self::poll).
    pub fn poll_timeout(&self, timeout: Duration) -> Vec<HydrogenEvent> {
        match self.completion_receiver.recv_timeout(timeout) {
            Ok(first) => {
                let mut events = vec![self.complete(first)];
                events.extend(self.poll());
                events
            }
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("Completion channel disconnected");
                Vec::new()
            }
        }
    }

    /// Number of requests currently checked out.
    pub fn active_requests(&self) -> usize {
        self.stats().map(|stats| stats.active).unwrap_or(0)
    }

    pub fn stats(&self) -> Result<PoolStats> {
        self.lock_pool()?.stats(self.pool_id)
    }

    fn complete(&self, completion: Completion) -> HydrogenEvent {
        let Completion {
            instance,
            request_id,
            result,
        } = completion;

        let callback = match self
            .lock_pool()
            .and_then(|mut pool| pool.get_mut(instance)?.begin_completion())
        {
            Ok(callback) => callback,
            Err(e) => {
                log::error!("Completion for {} on {} rejected: {}", request_id, instance, e);
                None
            }
        };

        let (status, headers, body, failure) = match result {
            Ok(response) => (response.status, response.headers, response.body, None),
            Err(e) => {
                log::warn!("{} failed: {}", request_id, e);
                let message = e.to_string();
                (
                    TRANSPORT_FAILURE_STATUS,
                    HashMap::new(),
                    message.clone(),
                    Some(message),
                )
            }
        };

        let panicked = match callback {
            Some(callback) => {
                std::panic::catch_unwind(AssertUnwindSafe(move || callback(status, headers, body)))
                    .is_err()
            }
            None => false,
        };

        match self.lock_pool() {
            Ok(mut pool) => {
                if let Err(e) = pool.release(instance) {
                    log::error!("Failed to release {}: {}", instance, e);
                }
            }
            Err(e) => log::error!("Failed to release {}: {}", instance, e),
        }

        if panicked {
            log::error!("Callback for {} panicked", request_id);
            HydrogenEvent::CallbackPanicked { request_id }
        } else if let Some(error) = failure {
            HydrogenEvent::RequestFailed { request_id, error }
        } else {
            log::debug!("{} completed with status {}", request_id, status);
            HydrogenEvent::RequestCompleted { request_id, status }
        }
    }

    fn lock_pool(&self) -> Result<MutexGuard<'_, ResourcePool<WebWorker>>> {
        self.pool
            .lock()
            .map_err(|_| HydrogenError::Dispatch("worker pool lock poisoned".into()))
    }
}

/// Returns a worker whose request never started. The start error wins over
/// any release failure.
fn abandon_start(
    pool: &mut ResourcePool<WebWorker>,
    instance: InstanceId,
    error: HydrogenError,
) -> HydrogenError {
    if let Err(release_error) = pool.release(instance) {
        log::error!("Failed to release {}: {}", instance, release_error);
    }
    error
}
