//! Synthetic flow generation.
//!
//! Fabricates network flows between lab topology addresses, with the full
//! 35-feature payload and a weighted-random verdict. Throughput features
//! use log-normal draws so heavy-tailed values occasionally trip the
//! rule classifier thresholds, which is the whole point of a demo feed.

use crate::config::{NetworkTopology, PipelineConfig, WELL_KNOWN_PORTS};
use crate::decision::DecisionSource;
use crate::record::{mint_id, Features, FlowRecord, Verdict, FEATURE_NAMES};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running totals since process start.
#[derive(Debug, Default)]
pub struct GeneratorStats {
    pub flows: AtomicU64,
    pub anomalies: AtomicU64,
    pub batches: AtomicU64,
}

impl GeneratorStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.flows.load(Ordering::Relaxed),
            self.anomalies.load(Ordering::Relaxed),
            self.batches.load(Ordering::Relaxed),
        )
    }
}

pub struct FlowGenerator {
    decisions: Arc<dyn DecisionSource>,
    topology: &'static NetworkTopology,
    anomaly_probability: f64,
    stats: GeneratorStats,
}

impl FlowGenerator {
    pub fn new(decisions: Arc<dyn DecisionSource>, config: &PipelineConfig) -> Self {
        Self {
            decisions,
            topology: NetworkTopology::lab(),
            anomaly_probability: config.anomaly_probability,
            stats: GeneratorStats::default(),
        }
    }

    pub fn stats(&self) -> &GeneratorStats {
        &self.stats
    }

    /// One flow between two distinct lab addresses.
    pub fn generate_flow(&self) -> FlowRecord {
        let ips = self.topology.all_ips();
        let src_ip = ips[self.decisions.pick(ips.len())];
        let dst_ip = loop {
            let candidate = ips[self.decisions.pick(ips.len())];
            if candidate != src_ip {
                break candidate;
            }
        };

        let verdict = if self.decisions.chance(self.anomaly_probability) {
            Verdict::Anomalous
        } else {
            Verdict::Normal
        };

        self.stats.flows.fetch_add(1, Ordering::Relaxed);
        if verdict.is_anomalous() {
            self.stats.anomalies.fetch_add(1, Ordering::Relaxed);
        }

        FlowRecord {
            id: mint_id("flow"),
            timestamp: Utc::now(),
            src_ip: src_ip.to_string(),
            dst_ip: dst_ip.to_string(),
            src_port: self.decisions.int_in(1024..=65_535) as u16,
            dst_port: WELL_KNOWN_PORTS[self.decisions.pick(WELL_KNOWN_PORTS.len())],
            verdict,
            features: self.generate_features(),
        }
    }

    /// A batch sized by the configured range.
    pub fn generate_batch(&self, size: u32) -> Vec<FlowRecord> {
        let batch = (0..size).map(|_| self.generate_flow()).collect();
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        batch
    }

    fn generate_features(&self) -> Features {
        let d = &self.decisions;

        let fwd_packets = d.int_in(1..=1000) as f64;
        let bwd_packets = d.int_in(1..=fwd_packets.max(1.0) as u64) as f64;
        let fwd_bytes = fwd_packets * d.int_in(64..=1500) as f64;
        let bwd_bytes = d.int_in(64..=fwd_bytes.max(64.0) as u64) as f64;

        // ln(50_000) center; sigma 1.5 puts ~2% of draws past the 1 MB/s
        // classifier threshold.
        let flow_bytes_per_s = d.lognormal(10.8, 1.5).clamp(100.0, 5_000_000.0);
        let flow_packets_per_s = d.lognormal(4.6, 1.4).clamp(1.0, 5_000.0);

        let mut features = Features::default();
        features.insert("Flow Duration", d.int_in(1_000..=300_000_000) as f64);
        features.insert("Total Fwd Packets", fwd_packets);
        features.insert("Total Backward Packets", bwd_packets);
        features.insert("Total Length of Fwd Packets", fwd_bytes);
        features.insert("Total Length of Bwd Packets", bwd_bytes);
        features.insert("Fwd Packet Length Max", d.int_in(64..=1500) as f64);
        features.insert("Fwd Packet Length Mean", d.int_in(64..=800) as f64);
        features.insert("Fwd Packet Length Std", d.uniform(0.0..=100.0));
        features.insert("Bwd Packet Length Max", d.int_in(64..=1500) as f64);
        features.insert("Bwd Packet Length Mean", d.int_in(64..=800) as f64);
        features.insert("Bwd Packet Length Std", d.uniform(0.0..=100.0));
        features.insert("Flow Bytes/s", flow_bytes_per_s);
        features.insert("Flow Packets/s", flow_packets_per_s);
        features.insert("Flow IAT Mean", d.uniform(0.0..=10_000.0));
        features.insert("Flow IAT Std", d.uniform(0.0..=5_000.0));
        features.insert("Flow IAT Max", d.uniform(0.0..=50_000.0));
        features.insert("Flow IAT Min", d.uniform(0.0..=1_000.0));
        features.insert("Fwd IAT Total", d.uniform(0.0..=100_000.0));
        features.insert("Fwd Header Length", d.int_in(20..=100) as f64);
        features.insert("Bwd Header Length", d.int_in(20..=100) as f64);
        features.insert("Min Packet Length", 64.0);
        features.insert("Max Packet Length", d.int_in(64..=1500) as f64);
        features.insert("Packet Length Mean", d.int_in(64..=800) as f64);
        features.insert("Packet Length Std", d.uniform(0.0..=200.0));
        features.insert("Packet Length Variance", d.uniform(0.0..=40_000.0));
        features.insert("ACK Flag Count", d.int_in(0..=fwd_packets as u64) as f64);
        features.insert("Down/Up Ratio", d.uniform(0.0..=10.0));
        features.insert("Average Packet Size", d.int_in(64..=800) as f64);
        features.insert("Avg Bwd Segment Size", d.int_in(0..=800) as f64);
        features.insert("Subflow Fwd Bytes", d.int_in(0..=fwd_bytes as u64) as f64);
        features.insert("Init_Win_bytes_forward", d.int_in(0..=65_535) as f64);
        features.insert("Init_Win_bytes_backward", d.int_in(0..=65_535) as f64);
        features.insert("Idle Mean", d.uniform(0.0..=10_000.0));
        features.insert("Idle Max", d.uniform(0.0..=50_000.0));
        features.insert("Idle Min", d.uniform(0.0..=1_000.0));

        debug_assert_eq!(features.len(), FEATURE_NAMES.len());
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::SeededDecisions;

    fn generator(seed: u64) -> FlowGenerator {
        FlowGenerator::new(
            Arc::new(SeededDecisions::new(seed)),
            &PipelineConfig::default(),
        )
    }

    #[test]
    fn flow_carries_all_contracted_features() {
        let r#gen = generator(3);
        for _ in 0..50 {
            let flow = r#gen.generate_flow();
            assert!(flow.features.is_complete(), "payload incomplete or non-finite");
        }
    }

    #[test]
    fn endpoints_are_distinct_topology_addresses() {
        let r#gen = generator(5);
        let topo = NetworkTopology::lab();
        let ips = topo.all_ips();
        for _ in 0..100 {
            let flow = r#gen.generate_flow();
            assert_ne!(flow.src_ip, flow.dst_ip);
            assert!(ips.contains(&flow.src_ip.as_str()));
            assert!(ips.contains(&flow.dst_ip.as_str()));
            assert!(flow.src_port >= 1024);
            assert!(WELL_KNOWN_PORTS.contains(&flow.dst_port));
        }
    }

    #[test]
    fn anomaly_rate_tracks_configuration() {
        let r#gen = generator(11);
        let anomalies = (0..4_000)
            .filter(|_| r#gen.generate_flow().verdict.is_anomalous())
            .count();
        let rate = anomalies as f64 / 4_000.0;
        assert!((rate - 0.25).abs() < 0.04, "rate was {rate}");
    }

    #[test]
    fn batch_respects_requested_size() {
        let r#gen = generator(9);
        assert_eq!(r#gen.generate_batch(6).len(), 6);
        let (flows, _, batches) = r#gen.stats().snapshot();
        assert_eq!(flows, 6);
        assert_eq!(batches, 1);
    }
}
