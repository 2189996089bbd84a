//! Root-cause analysis over anomalous flows.
//!
//! Two independent mock stages run for every anomalous flow: a rule-based
//! threshold pass over the feature payload (`rules`) and a simulated
//! device-health pass over the network path (`netcheck`). Either stage may
//! come back empty; an empty stage simply skips its remediation step.

pub mod netcheck;
pub mod rules;

pub use netcheck::{HealthCategory, HealthProbe, TargetDevice};
pub use rules::{classify, RuleCategory};
