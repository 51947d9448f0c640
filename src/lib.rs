//! # sidecar-host
//!
//! Supervisor for a long-lived sidecar worker process speaking newline-
//! delimited JSON over stdin/stdout.
//!
//! The supervisor owns exactly one worker instance at a time and provides:
//!
//! - request/response correlation for any number of concurrent in-flight
//!   calls, including incremental (chunked) responses for long-running
//!   operations;
//! - per-call timeouts that never leave a caller waiting forever;
//! - liveness probing that tells a wedged-but-running worker apart from a
//!   working one, and force-restarts the former;
//! - bounded-retry restart with a backoff schedule, escalating to a fatal,
//!   user-visible notification once the cap is hit;
//! - an allow-listed environment for the worker, so ambient secrets in the
//!   host process never reach the child.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::json;
//! use sidecar_host::{Sidecar, SidecarConfig};
//!
//! # async fn demo() -> sidecar_host::SidecarResult<()> {
//! let (events, _event_rx) = tokio::sync::mpsc::unbounded_channel();
//! let sidecar = Sidecar::new(
//!     SidecarConfig::new(vec!["python3".into(), "engine.py".into()]),
//!     events,
//! );
//! sidecar.start().await?;
//! let reply = sidecar
//!     .call("intent", json!({"text": "remind me tomorrow"}), Duration::from_secs(5))
//!     .await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod supervisor;
pub mod worker;

pub use config::SidecarConfig;
pub use error::{SidecarError, SidecarResult};
pub use supervisor::lifecycle::LifecycleState;
pub use supervisor::{Sidecar, SidecarEvent, StreamingCall};
