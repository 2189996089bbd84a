//! Core record types shared across the pipeline.
//!
//! A `FlowRecord` is one synthetic network flow with its 35-dimensional
//! feature payload; a `ResponseRecord` tracks the remediation attempted for
//! an anomalous flow across both classification stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The 35 feature names every flow record carries. Order matters for
/// downstream consumers that treat the payload as a vector.
pub const FEATURE_NAMES: [&str; 35] = [
    "Flow Duration",
    "Total Fwd Packets",
    "Total Backward Packets",
    "Total Length of Fwd Packets",
    "Total Length of Bwd Packets",
    "Fwd Packet Length Max",
    "Fwd Packet Length Mean",
    "Fwd Packet Length Std",
    "Bwd Packet Length Max",
    "Bwd Packet Length Mean",
    "Bwd Packet Length Std",
    "Flow Bytes/s",
    "Flow Packets/s",
    "Flow IAT Mean",
    "Flow IAT Std",
    "Flow IAT Max",
    "Flow IAT Min",
    "Fwd IAT Total",
    "Fwd Header Length",
    "Bwd Header Length",
    "Min Packet Length",
    "Max Packet Length",
    "Packet Length Mean",
    "Packet Length Std",
    "Packet Length Variance",
    "ACK Flag Count",
    "Down/Up Ratio",
    "Average Packet Size",
    "Avg Bwd Segment Size",
    "Subflow Fwd Bytes",
    "Init_Win_bytes_forward",
    "Init_Win_bytes_backward",
    "Idle Mean",
    "Idle Max",
    "Idle Min",
];

/// Subset of features the rule-based classifier looks at.
pub const RULE_FEATURE_NAMES: [&str; 9] = [
    "Flow Duration",
    "Total Length of Fwd Packets",
    "Total Length of Bwd Packets",
    "Flow Bytes/s",
    "Flow Packets/s",
    "Fwd Header Length",
    "Bwd Header Length",
    "Max Packet Length",
    "Packet Length Mean",
];

/// Named feature payload. BTreeMap keeps serialization order stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Features(pub BTreeMap<String, f64>);

impl Features {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Missing features read as zero, matching the classifier contract.
    pub fn get_or_zero(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Project onto the rule-classifier subset.
    pub fn rule_subset(&self) -> Features {
        let mut subset = BTreeMap::new();
        for name in RULE_FEATURE_NAMES {
            subset.insert(name.to_string(), self.get_or_zero(name));
        }
        Features(subset)
    }

    /// True when the payload contains exactly the 35 contracted names with
    /// finite values.
    pub fn is_complete(&self) -> bool {
        self.0.len() == FEATURE_NAMES.len()
            && FEATURE_NAMES
                .iter()
                .all(|name| self.get(name).is_some_and(f64::is_finite))
    }
}

/// Detection verdict on a flow. Transitions only from Normal to Anomalous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Normal,
    Anomalous,
}

impl Verdict {
    pub fn is_anomalous(self) -> bool {
        matches!(self, Verdict::Anomalous)
    }
}

/// One synthetic network flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub verdict: Verdict,
    pub features: Features,
}

/// Remediation record for one anomalous flow. Created by stage 1, patched
/// in place by stage 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    pub flow_id: String,
    pub timestamp: DateTime<Utc>,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    /// Stage-1 anomaly category and remediation plan name.
    pub category1: Option<String>,
    pub action1: Option<String>,
    /// Stage-2 anomaly category and remediation plan name.
    pub category2: Option<String>,
    pub action2: Option<String>,
    /// The rule-classifier feature subset the verdict was based on.
    pub feature_subset: Features,
    /// Conjunction of stage outcomes. Once false, stays false.
    pub success: bool,
    pub duration_ms_stage1: u64,
    pub duration_ms_stage2: Option<u64>,
}

/// Mint a unique record identifier: `<prefix>_<utc timestamp>_<12 hex>`.
pub fn mint_id(prefix: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, stamp, &suffix[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn feature_names_are_distinct() {
        let set: HashSet<&str> = FEATURE_NAMES.iter().copied().collect();
        assert_eq!(set.len(), 35);
        for name in RULE_FEATURE_NAMES {
            assert!(set.contains(name), "subset name {name:?} not in full set");
        }
    }

    #[test]
    fn rule_subset_defaults_missing_to_zero() {
        let mut features = Features::default();
        features.insert("Flow Bytes/s", 123.0);
        let subset = features.rule_subset();
        assert_eq!(subset.len(), 9);
        assert_eq!(subset.get("Flow Bytes/s"), Some(123.0));
        assert_eq!(subset.get("Flow Duration"), Some(0.0));
    }

    #[test]
    fn incomplete_payload_detected() {
        let mut features = Features::default();
        for name in &FEATURE_NAMES[..34] {
            features.insert(name, 1.0);
        }
        assert!(!features.is_complete());
        features.insert(FEATURE_NAMES[34], f64::NAN);
        assert!(!features.is_complete());
        features.insert(FEATURE_NAMES[34], 1.0);
        assert!(features.is_complete());
    }

    #[test]
    fn minted_ids_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(mint_id("flow")));
        }
    }

    #[test]
    fn id_has_expected_shape() {
        let id = mint_id("flow");
        assert!(id.starts_with("flow_"));
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].len(), 12);
    }

    #[test]
    fn verdict_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Verdict::Anomalous).unwrap(),
            "\"anomalous\""
        );
    }
}
