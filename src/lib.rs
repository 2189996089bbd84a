//! # anbd - Anomaly Network Behavior Detection demo pipeline
//!
//! Fabricates synthetic network flows, flags a fraction anomalous, runs two
//! mock root-cause stages over each anomaly, records simulated remediation
//! and pushes live updates to dashboard subscribers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Pipeline                               │
//! │                                                                  │
//! │  ┌───────────┐   ┌─────────┐   ┌──────────────────────────────┐  │
//! │  │ Generator │──▶│  Store  │──▶│  RCA fan-out                 │  │
//! │  │ (batches) │   │ (flows) │   │  ├─ rules    (thresholds)    │  │
//! │  └───────────┘   └─────────┘   │  └─ netcheck (device health) │  │
//! │        │              ▲        └──────────────┬───────────────┘  │
//! │        │              │                       ▼                  │
//! │        │              │        ┌──────────────────────────────┐  │
//! │        │              └────────│  ResponseExecutor            │  │
//! │        │                       │  (stage 1 creates the row,   │  │
//! │        │                       │   stage 2 patches it)        │  │
//! │        ▼                       └──────────────────────────────┘  │
//! │  ┌───────────────────────────────────────────────────────────┐   │
//! │  │ Publisher (broadcast) ──▶ /ws dashboard subscribers       │   │
//! │  └───────────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Detection and remediation are simulated: weighted-random verdicts stand
//! in for a model, canned action plans stand in for playbooks. The
//! lifecycle, persistence and push semantics are real.

pub mod api;
pub mod config;
pub mod decision;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod publisher;
pub mod rca;
pub mod record;
pub mod response;
pub mod state;
pub mod store;

pub use config::{PipelineConfig, RuleThresholds};
pub use decision::{DecisionSource, LiveDecisions, SeededDecisions};
pub use error::{LifecycleError, PipelineError, StoreError};
pub use pipeline::Pipeline;
pub use publisher::{ChannelPublisher, NullPublisher, Publisher, PushEvent};
pub use record::{FlowRecord, ResponseRecord, Verdict};
pub use store::{MemoryStore, RecordStore};
