//! Rule-based anomaly classification.
//!
//! A pure function of the feature payload and the threshold table: no
//! randomness, no I/O. Predicates run in a fixed order and the first match
//! wins, so a flow exceeding several thresholds still maps to exactly one
//! category. Missing features read as zero.

use crate::config::RuleThresholds;
use crate::record::Features;
use serde::{Deserialize, Serialize};

/// Categories the rule pass can assign, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    BandwidthSaturation,
    ThroughputAnomaly,
    HeaderLength,
    PacketSize,
    FlowDuration,
}

impl RuleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleCategory::BandwidthSaturation => "bandwidth_saturation",
            RuleCategory::ThroughputAnomaly => "throughput_anomaly",
            RuleCategory::HeaderLength => "header_length",
            RuleCategory::PacketSize => "packet_size",
            RuleCategory::FlowDuration => "flow_duration",
        }
    }
}

/// Classify a feature payload. `None` means no predicate fired.
pub fn classify(features: &Features, thresholds: &RuleThresholds) -> Option<RuleCategory> {
    if features.get_or_zero("Flow Bytes/s") > thresholds.flow_bytes_per_sec
        || features.get_or_zero("Flow Packets/s") > thresholds.flow_packets_per_sec
    {
        return Some(RuleCategory::BandwidthSaturation);
    }

    if features.get_or_zero("Total Length of Fwd Packets") > thresholds.total_fwd_bytes
        || features.get_or_zero("Total Length of Bwd Packets") > thresholds.total_bwd_bytes
    {
        return Some(RuleCategory::ThroughputAnomaly);
    }

    if features.get_or_zero("Fwd Header Length") > thresholds.fwd_header_length
        || features.get_or_zero("Bwd Header Length") > thresholds.bwd_header_length
    {
        return Some(RuleCategory::HeaderLength);
    }

    if features.get_or_zero("Max Packet Length") > thresholds.max_packet_length
        || features.get_or_zero("Packet Length Mean") > thresholds.packet_length_mean
    {
        return Some(RuleCategory::PacketSize);
    }

    if features.get_or_zero("Flow Duration") > thresholds.flow_duration {
        return Some(RuleCategory::FlowDuration);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, f64)]) -> Features {
        let mut f = Features::default();
        for (name, value) in pairs {
            f.insert(name, *value);
        }
        f
    }

    #[test]
    fn bandwidth_wins_over_later_predicates() {
        // Exceeds bandwidth AND would match nothing else below it wrongly.
        let f = features(&[
            ("Flow Bytes/s", 2_000_000.0),
            ("Flow Packets/s", 2_000.0),
            ("Total Length of Fwd Packets", 1_000.0),
            ("Total Length of Bwd Packets", 1_000.0),
            ("Fwd Header Length", 20.0),
            ("Bwd Header Length", 20.0),
            ("Max Packet Length", 1_500.0),
            ("Packet Length Mean", 500.0),
            ("Flow Duration", 60_000_000.0),
        ]);
        assert_eq!(
            classify(&f, &RuleThresholds::default()),
            Some(RuleCategory::BandwidthSaturation)
        );
    }

    #[test]
    fn first_match_wins_when_multiple_fire() {
        // Both bandwidth and throughput thresholds exceeded.
        let f = features(&[
            ("Flow Bytes/s", 2_000_000.0),
            ("Total Length of Fwd Packets", 20_000.0),
        ]);
        assert_eq!(
            classify(&f, &RuleThresholds::default()),
            Some(RuleCategory::BandwidthSaturation)
        );
    }

    #[test]
    fn each_category_reachable() {
        let t = RuleThresholds::default();
        let cases = [
            (
                features(&[("Total Length of Bwd Packets", 15_000.0)]),
                RuleCategory::ThroughputAnomaly,
            ),
            (
                features(&[("Fwd Header Length", 120.0)]),
                RuleCategory::HeaderLength,
            ),
            (
                features(&[("Packet Length Mean", 1_200.0)]),
                RuleCategory::PacketSize,
            ),
            (
                features(&[("Flow Duration", 400_000_000.0)]),
                RuleCategory::FlowDuration,
            ),
        ];
        for (f, expected) in cases {
            assert_eq!(classify(&f, &t), Some(expected));
        }
    }

    #[test]
    fn normal_traffic_matches_nothing() {
        let f = features(&[
            ("Flow Bytes/s", 50_000.0),
            ("Flow Packets/s", 100.0),
            ("Total Length of Fwd Packets", 5_000.0),
            ("Total Length of Bwd Packets", 4_800.0),
            ("Fwd Header Length", 20.0),
            ("Bwd Header Length", 20.0),
            ("Max Packet Length", 1_500.0),
            ("Packet Length Mean", 500.0),
            ("Flow Duration", 60_000_000.0),
        ]);
        assert_eq!(classify(&f, &RuleThresholds::default()), None);
    }

    #[test]
    fn missing_features_read_as_zero() {
        assert_eq!(classify(&Features::default(), &RuleThresholds::default()), None);
    }

    #[test]
    fn classification_is_deterministic() {
        let f = features(&[("Flow Packets/s", 5_000.0)]);
        let t = RuleThresholds::default();
        let first = classify(&f, &t);
        for _ in 0..100 {
            assert_eq!(classify(&f, &t), first);
        }
    }

    #[test]
    fn threshold_is_strict_inequality() {
        // Exactly at threshold does not fire.
        let f = features(&[("Max Packet Length", 1_500.0)]);
        assert_eq!(classify(&f, &RuleThresholds::default()), None);
    }

    #[test]
    fn category_names_serialize_snake_case() {
        assert_eq!(RuleCategory::BandwidthSaturation.as_str(), "bandwidth_saturation");
        assert_eq!(
            serde_json::to_string(&RuleCategory::PacketSize).unwrap(),
            "\"packet_size\""
        );
    }
}
