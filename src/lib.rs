//! Hydrogen: pooled resources, web request dispatching and fading audio
//! stack items for game runtimes.
//!
//! # Quick start
//!
//! ```no_run
//! use hydrogen::{AudioClip, AudioStack, AudioStackItem, WebPoolDesc};
//!
//! let web = hydrogen::singleton::init(WebPoolDesc::default().persistent(false))?;
//! web.get("https://example.com/status", |status, _headers, body| {
//!     println!("status {}: {}", status, body);
//! })?;
//!
//! let mut stack = AudioStack::default();
//! stack.add(AudioStackItem::new(AudioClip::new("theme", 90.0)).fade(true).looping(true))?;
//!
//! // Each frame:
//! for event in web.poll().into_iter().chain(stack.update(1.0 / 60.0)) {
//!     println!("{:?}", event);
//! }
//! # Ok::<(), hydrogen::HydrogenError>(())
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod pool;
pub mod singleton;
pub mod web;

pub use audio::{AudioClip, AudioSource, AudioStack, AudioStackItem};
pub use config::{AudioStackDesc, PoolDesc, WebPoolDesc};
pub use error::{HydrogenError, TransportError};
pub use events::HydrogenEvent;
pub use pool::{InstanceId, PoolId, PoolStats, PooledWorker, ResourcePool};
pub use web::{
    FormBinaryData, HttpTransport, RequestId, RequestParameters, TRANSPORT_FAILURE_STATUS,
    Transport, WebCallback, WebPool,
};
