//! Pipeline configuration and the static lab topology.
//!
//! Tunables live in `PipelineConfig`; classifier thresholds come from
//! `RuleThresholds` and can be overridden through the environment. The
//! device/VLAN tables mirror a small GNS3 lab and back both flow synthesis
//! and stage-2 device resolution.

use ipnet::Ipv4Net;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;

/// Destination ports the generator draws from.
pub const WELL_KNOWN_PORTS: [u16; 10] = [22, 23, 53, 80, 443, 993, 995, 3306, 5432, 8080];

/// Top-level pipeline tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Probability a generated flow is marked anomalous.
    pub anomaly_probability: f64,
    /// Flows per generated batch.
    pub batch_size: RangeInclusive<u64>,
    /// Seconds to wait between batches.
    pub batch_interval_secs: RangeInclusive<u64>,
    /// Simulated stage-1 remediation delay, milliseconds.
    pub stage1_delay_ms: RangeInclusive<u64>,
    /// Simulated stage-2 remediation delay, milliseconds.
    pub stage2_delay_ms: RangeInclusive<u64>,
    pub stage1_success_rate: f64,
    pub stage2_success_rate: f64,
    pub thresholds: RuleThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            anomaly_probability: 0.25,
            batch_size: 3..=8,
            batch_interval_secs: 10..=30,
            stage1_delay_ms: 1_000..=5_000,
            stage2_delay_ms: 2_000..=8_000,
            stage1_success_rate: 0.90,
            stage2_success_rate: 0.85,
            thresholds: RuleThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults with thresholds pulled from the environment.
    pub fn from_env() -> Self {
        Self {
            thresholds: RuleThresholds::from_env(),
            ..Self::default()
        }
    }

    /// Zero-delay variant for tests and fast local runs.
    pub fn instant() -> Self {
        Self {
            batch_interval_secs: 0..=0,
            stage1_delay_ms: 0..=0,
            stage2_delay_ms: 0..=0,
            ..Self::default()
        }
    }
}

/// Thresholds for the rule-based classifier. Each field can be overridden
/// with an `ANBD_THRESHOLD_*` environment variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    pub flow_bytes_per_sec: f64,
    pub flow_packets_per_sec: f64,
    pub total_fwd_bytes: f64,
    pub total_bwd_bytes: f64,
    pub fwd_header_length: f64,
    pub bwd_header_length: f64,
    pub max_packet_length: f64,
    pub packet_length_mean: f64,
    /// Microseconds.
    pub flow_duration: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            flow_bytes_per_sec: 1_000_000.0,
            flow_packets_per_sec: 1_000.0,
            total_fwd_bytes: 10_000.0,
            total_bwd_bytes: 10_000.0,
            fwd_header_length: 100.0,
            bwd_header_length: 100.0,
            max_packet_length: 1_500.0,
            packet_length_mean: 1_000.0,
            flow_duration: 300_000_000.0,
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl RuleThresholds {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            flow_bytes_per_sec: env_f64("ANBD_THRESHOLD_FLOW_BYTES_PER_SEC", d.flow_bytes_per_sec),
            flow_packets_per_sec: env_f64(
                "ANBD_THRESHOLD_FLOW_PACKETS_PER_SEC",
                d.flow_packets_per_sec,
            ),
            total_fwd_bytes: env_f64("ANBD_THRESHOLD_TOTAL_FWD_BYTES", d.total_fwd_bytes),
            total_bwd_bytes: env_f64("ANBD_THRESHOLD_TOTAL_BWD_BYTES", d.total_bwd_bytes),
            fwd_header_length: env_f64("ANBD_THRESHOLD_FWD_HEADER_LENGTH", d.fwd_header_length),
            bwd_header_length: env_f64("ANBD_THRESHOLD_BWD_HEADER_LENGTH", d.bwd_header_length),
            max_packet_length: env_f64("ANBD_THRESHOLD_MAX_PACKET_LENGTH", d.max_packet_length),
            packet_length_mean: env_f64("ANBD_THRESHOLD_PACKET_LENGTH_MEAN", d.packet_length_mean),
            flow_duration: env_f64("ANBD_THRESHOLD_FLOW_DURATION", d.flow_duration),
        }
    }
}

// ============================================================================
// Lab topology
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub name: &'static str,
    pub kind: &'static str,
    pub management_ip: &'static str,
    /// (interface name, address) pairs.
    pub interfaces: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone, Serialize)]
pub struct Vlan {
    pub name: &'static str,
    pub subnet: Ipv4Net,
    pub gateway: &'static str,
    pub devices: &'static [&'static str],
    pub switch: &'static str,
    pub router: &'static str,
}

/// The simulated network: six managed devices plus four access VLANs.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    pub devices: Vec<Device>,
    pub vlans: Vec<Vlan>,
}

static DEVICES: &[Device] = &[
    Device {
        name: "CORE-RO-1",
        kind: "cisco_router",
        management_ip: "192.168.61.1",
        interfaces: &[
            ("FastEthernet0/0", "192.168.60.2"),
            ("FastEthernet1/0", "192.168.60.14"),
            ("FastEthernet1/1", "192.168.60.17"),
            ("FastEthernet2/0", "192.168.60.25"),
            ("FastEthernet2/1", "192.168.60.29"),
            ("FastEthernet3/0", "192.168.61.1"),
        ],
    },
    Device {
        name: "CORE-RO-2",
        kind: "cisco_router",
        management_ip: "192.168.60.26",
        interfaces: &[
            ("FastEthernet1/0", "192.168.60.6"),
            ("FastEthernet0/0", "192.168.60.10"),
            ("FastEthernet1/1", "192.168.60.21"),
            ("FastEthernet2/0", "192.168.60.26"),
            ("FastEthernet2/1", "192.168.60.30"),
        ],
    },
    Device {
        name: "DT-RO-1",
        kind: "cisco_router",
        management_ip: "192.168.60.1",
        interfaces: &[
            ("FastEthernet1/0", "192.168.60.1"),
            ("FastEthernet1/1", "192.168.60.5"),
        ],
    },
    Device {
        name: "DT-RO-2",
        kind: "cisco_router",
        management_ip: "192.168.60.9",
        interfaces: &[
            ("FastEthernet1/0", "192.168.60.9"),
            ("FastEthernet1/1", "192.168.60.13"),
        ],
    },
    Device {
        name: "EDGE-FW",
        kind: "cisco_asa",
        management_ip: "192.168.60.18",
        interfaces: &[
            ("GigabitEthernet0/0", "192.168.60.18"),
            ("GigabitEthernet0/1", "192.168.60.22"),
            ("GigabitEthernet0/2", "192.168.137.2"),
        ],
    },
    Device {
        name: "Ubuntu-Gateway",
        kind: "linux_server",
        management_ip: "192.168.61.2",
        interfaces: &[("eth0", "192.168.61.2")],
    },
];

struct VlanSpec {
    name: &'static str,
    subnet: &'static str,
    gateway: &'static str,
    devices: &'static [&'static str],
    switch: &'static str,
    router: &'static str,
}

static VLAN_SPECS: &[VlanSpec] = &[
    VlanSpec {
        name: "VLAN10",
        subnet: "192.168.10.0/24",
        gateway: "192.168.10.1",
        devices: &["192.168.10.1", "192.168.10.2"],
        switch: "AC-SW-1",
        router: "DT-RO-1",
    },
    VlanSpec {
        name: "VLAN20",
        subnet: "192.168.20.0/24",
        gateway: "192.168.20.1",
        devices: &["192.168.20.1", "192.168.20.2"],
        switch: "AC-SW-2",
        router: "DT-RO-1",
    },
    VlanSpec {
        name: "VLAN30",
        subnet: "192.168.30.0/24",
        gateway: "192.168.30.1",
        devices: &["192.168.30.1", "192.168.30.2"],
        switch: "AC-SW-3",
        router: "DT-RO-2",
    },
    VlanSpec {
        name: "VLAN40",
        subnet: "192.168.40.0/24",
        gateway: "192.168.40.1",
        devices: &["192.168.40.1", "192.168.40.2"],
        switch: "AC-SW-4",
        router: "DT-RO-2",
    },
];

static TOPOLOGY: Lazy<NetworkTopology> = Lazy::new(|| NetworkTopology {
    devices: DEVICES.to_vec(),
    vlans: VLAN_SPECS
        .iter()
        .map(|spec| Vlan {
            name: spec.name,
            subnet: spec.subnet.parse().expect("valid subnet literal"),
            gateway: spec.gateway,
            devices: spec.devices,
            switch: spec.switch,
            router: spec.router,
        })
        .collect(),
});

impl NetworkTopology {
    /// Shared lab topology used by the generator and stage-2 resolution.
    pub fn lab() -> &'static NetworkTopology {
        &TOPOLOGY
    }

    /// Every addressable IP: device management and interface addresses plus
    /// VLAN member hosts.
    pub fn all_ips(&self) -> Vec<&'static str> {
        let mut ips: Vec<&'static str> = Vec::new();
        for device in &self.devices {
            if !ips.contains(&device.management_ip) {
                ips.push(device.management_ip);
            }
            for (_, addr) in device.interfaces {
                if !ips.contains(addr) {
                    ips.push(addr);
                }
            }
        }
        for vlan in &self.vlans {
            ips.extend(vlan.devices.iter().copied());
        }
        ips
    }

    /// Find the managed device owning an address (management or interface).
    pub fn device_by_ip(&self, ip: &str) -> Option<&Device> {
        self.devices.iter().find(|device| {
            device.management_ip == ip || device.interfaces.iter().any(|(_, addr)| *addr == ip)
        })
    }

    /// Find the VLAN whose subnet contains an address.
    pub fn vlan_by_ip(&self, ip: &str) -> Option<&Vlan> {
        let addr: Ipv4Addr = ip.parse().ok()?;
        self.vlans.iter().find(|vlan| vlan.subnet.contains(&addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_has_expected_shape() {
        let topo = NetworkTopology::lab();
        assert_eq!(topo.devices.len(), 6);
        assert_eq!(topo.vlans.len(), 4);
        assert!(topo.all_ips().len() >= 20);
    }

    #[test]
    fn device_lookup_covers_interfaces() {
        let topo = NetworkTopology::lab();
        assert_eq!(topo.device_by_ip("192.168.61.1").unwrap().name, "CORE-RO-1");
        assert_eq!(topo.device_by_ip("192.168.60.22").unwrap().name, "EDGE-FW");
        assert!(topo.device_by_ip("10.0.0.1").is_none());
    }

    #[test]
    fn vlan_lookup_is_subnet_based() {
        let topo = NetworkTopology::lab();
        // .77 is not in the VLAN's device list but sits inside its subnet.
        assert_eq!(topo.vlan_by_ip("192.168.30.77").unwrap().name, "VLAN30");
        assert!(topo.vlan_by_ip("192.168.99.1").is_none());
        assert!(topo.vlan_by_ip("not-an-ip").is_none());
    }

    #[test]
    fn default_thresholds_match_contract() {
        let t = RuleThresholds::default();
        assert_eq!(t.flow_bytes_per_sec, 1_000_000.0);
        assert_eq!(t.flow_duration, 300_000_000.0);
    }
}
