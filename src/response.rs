//! Simulated remediation.
//!
//! Every anomaly category maps to a canned action plan. Execution sleeps
//! for a configured delay to imitate playbook runtime, rolls a success
//! probability, and records the outcome. Stage 1 creates the response row;
//! stage 2 patches it and can only make `success` worse.

use crate::config::PipelineConfig;
use crate::decision::DecisionSource;
use crate::error::StoreError;
use crate::publisher::{Publisher, PushEvent};
use crate::rca::{HealthCategory, RuleCategory};
use crate::record::{mint_id, FlowRecord, ResponseRecord};
use crate::store::{RecordStore, Stage2Patch};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Canned remediation plan for one anomaly category.
#[derive(Debug, Clone, Copy)]
pub struct ActionPlan {
    pub name: &'static str,
    pub actions: &'static [&'static str],
}

/// Plan for a stage-1 (rule) category.
pub fn stage1_plan(category: &str) -> ActionPlan {
    match category {
        "bandwidth_saturation" => ActionPlan {
            name: "bandwidth_optimization",
            actions: &[
                "Applied traffic shaping",
                "Enabled QoS policies",
                "Increased buffer sizes",
            ],
        },
        "throughput_anomaly" => ActionPlan {
            name: "throughput_optimization",
            actions: &[
                "Optimized TCP window size",
                "Adjusted flow control",
                "Updated routing metrics",
            ],
        },
        "header_length" => ActionPlan {
            name: "header_normalization",
            actions: &[
                "Applied header compression",
                "Filtered malformed packets",
                "Updated protocol settings",
            ],
        },
        "packet_size" => ActionPlan {
            name: "packet_optimization",
            actions: &[
                "Configured MTU discovery",
                "Applied fragmentation rules",
                "Optimized packet sizes",
            ],
        },
        "flow_duration" => ActionPlan {
            name: "flow_management",
            actions: &[
                "Adjusted connection timeouts",
                "Applied flow limits",
                "Optimized session handling",
            ],
        },
        _ => ActionPlan {
            name: "generic_fix",
            actions: &["Applied generic mitigation"],
        },
    }
}

/// Plan for a stage-2 (health) category.
pub fn stage2_plan(category: &str) -> ActionPlan {
    match category {
        "high_latency" => ActionPlan {
            name: "latency_mitigation",
            actions: &[
                "Optimized routing paths",
                "Adjusted interface priorities",
                "Applied traffic prioritization",
            ],
        },
        "high_error_rates" => ActionPlan {
            name: "error_correction",
            actions: &[
                "Reset interface counters",
                "Applied error correction",
                "Updated interface configuration",
            ],
        },
        "connectivity_issues" => ActionPlan {
            name: "connectivity_restore",
            actions: &[
                "Restarted network services",
                "Cleared ARP tables",
                "Applied routing updates",
            ],
        },
        "packet_loss" => ActionPlan {
            name: "loss_prevention",
            actions: &[
                "Increased buffer sizes",
                "Applied packet prioritization",
                "Optimized queue management",
            ],
        },
        "flapping_links" => ActionPlan {
            name: "link_stabilization",
            actions: &[
                "Applied dampening policies",
                "Stabilized interface",
                "Updated link parameters",
            ],
        },
        _ => ActionPlan {
            name: "generic_network_fix",
            actions: &["Applied generic network mitigation"],
        },
    }
}

pub struct ResponseExecutor {
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn Publisher>,
    decisions: Arc<dyn DecisionSource>,
    config: PipelineConfig,
}

impl ResponseExecutor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn Publisher>,
        decisions: Arc<dyn DecisionSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            decisions,
            config,
        }
    }

    /// Run the stage-1 remediation for an anomalous flow and record it.
    pub async fn execute_stage1(
        &self,
        flow: &FlowRecord,
        category: RuleCategory,
    ) -> Result<ResponseRecord, StoreError> {
        let plan = stage1_plan(category.as_str());

        let delay_ms = self.decisions.int_in(self.config.stage1_delay_ms.clone());
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let success = self.decisions.chance(self.config.stage1_success_rate);

        let response = ResponseRecord {
            id: mint_id("anomaly"),
            flow_id: flow.id.clone(),
            timestamp: Utc::now(),
            src_ip: flow.src_ip.clone(),
            dst_ip: flow.dst_ip.clone(),
            src_port: flow.src_port,
            dst_port: flow.dst_port,
            category1: Some(category.as_str().to_string()),
            action1: Some(plan.name.to_string()),
            category2: None,
            action2: None,
            feature_subset: flow.features.rule_subset(),
            success,
            duration_ms_stage1: delay_ms,
            duration_ms_stage2: None,
        };

        self.store.create_response(response.clone()).await?;

        info!(
            response_id = %response.id,
            flow_id = %flow.id,
            category = category.as_str(),
            success,
            "stage-1 response executed"
        );

        self.publisher.broadcast(PushEvent::NewResponse(response.clone()));
        self.publisher.broadcast(PushEvent::ResponseExecuted {
            response_id: response.id.clone(),
            stage: 1,
            category: category.as_str().to_string(),
            success,
            duration_ms: delay_ms,
            actions: plan.actions.iter().map(|s| s.to_string()).collect(),
        });

        Ok(response)
    }

    /// Patch the flow's response row with stage-2 results. Fails with
    /// `ResponseNotFound` when stage 1 has not created the row yet.
    pub async fn execute_stage2(
        &self,
        flow_id: &str,
        category: HealthCategory,
    ) -> Result<ResponseRecord, StoreError> {
        // Look up first so a missing row fails before any simulated work.
        self.store.response_by_flow(flow_id).await?;

        let plan = stage2_plan(category.as_str());

        let delay_ms = self.decisions.int_in(self.config.stage2_delay_ms.clone());
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let success = self.decisions.chance(self.config.stage2_success_rate);

        let response = self
            .store
            .apply_stage2(
                flow_id,
                Stage2Patch {
                    category: category.as_str().to_string(),
                    action: plan.name.to_string(),
                    success,
                    duration_ms: delay_ms,
                },
            )
            .await?;

        info!(
            response_id = %response.id,
            flow_id,
            category = category.as_str(),
            success,
            "stage-2 response executed"
        );

        self.publisher.broadcast(PushEvent::ResponseExecuted {
            response_id: response.id.clone(),
            stage: 2,
            category: category.as_str().to_string(),
            success,
            duration_ms: delay_ms,
            actions: plan.actions.iter().map(|s| s.to_string()).collect(),
        });

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::SeededDecisions;
    use crate::publisher::NullPublisher;
    use crate::record::{Features, Verdict};
    use crate::store::MemoryStore;

    fn executor(seed: u64) -> (Arc<MemoryStore>, ResponseExecutor) {
        let store = Arc::new(MemoryStore::new());
        let exec = ResponseExecutor::new(
            store.clone(),
            Arc::new(NullPublisher),
            Arc::new(SeededDecisions::new(seed)),
            PipelineConfig::instant(),
        );
        (store, exec)
    }

    fn flow() -> FlowRecord {
        FlowRecord {
            id: mint_id("flow"),
            timestamp: Utc::now(),
            src_ip: "192.168.10.1".to_string(),
            dst_ip: "192.168.61.2".to_string(),
            src_port: 40_000,
            dst_port: 443,
            verdict: Verdict::Anomalous,
            features: Features::default(),
        }
    }

    #[tokio::test]
    async fn stage1_creates_row_with_subset() {
        let (store, exec) = executor(1);
        let f = flow();
        let response = exec
            .execute_stage1(&f, RuleCategory::BandwidthSaturation)
            .await
            .unwrap();

        assert_eq!(response.flow_id, f.id);
        assert_eq!(response.category1.as_deref(), Some("bandwidth_saturation"));
        assert_eq!(response.action1.as_deref(), Some("bandwidth_optimization"));
        assert_eq!(response.feature_subset.len(), 9);
        assert!(response.category2.is_none());

        let stored = store.response_by_flow(&f.id).await.unwrap();
        assert_eq!(stored.id, response.id);
    }

    #[tokio::test]
    async fn stage2_requires_existing_row() {
        let (_store, exec) = executor(2);
        let result = exec
            .execute_stage2("flow_never_seen", HealthCategory::PacketLoss)
            .await;
        assert!(matches!(result, Err(StoreError::ResponseNotFound(_))));
    }

    #[tokio::test]
    async fn stage2_patches_in_place() {
        let (store, exec) = executor(3);
        let f = flow();
        exec.execute_stage1(&f, RuleCategory::HeaderLength)
            .await
            .unwrap();
        let patched = exec
            .execute_stage2(&f.id, HealthCategory::HighLatency)
            .await
            .unwrap();

        assert_eq!(patched.category2.as_deref(), Some("high_latency"));
        assert_eq!(patched.action2.as_deref(), Some("latency_mitigation"));
        assert!(patched.duration_ms_stage2.is_some());

        let counts = store.counts().await;
        assert_eq!(counts.total_responses, 1);
    }

    #[tokio::test]
    async fn failed_stage_sticks() {
        // Walk seeds until stage 1 fails, then confirm stage 2 cannot
        // restore success.
        for seed in 0..200 {
            let (_store, exec) = executor(seed);
            let f = flow();
            let response = exec
                .execute_stage1(&f, RuleCategory::PacketSize)
                .await
                .unwrap();
            if response.success {
                continue;
            }
            let patched = exec
                .execute_stage2(&f.id, HealthCategory::FlappingLinks)
                .await
                .unwrap();
            assert!(!patched.success);
            return;
        }
        panic!("no seed produced a stage-1 failure");
    }

    #[test]
    fn unknown_categories_get_generic_plans() {
        assert_eq!(stage1_plan("mystery").name, "generic_fix");
        assert_eq!(stage2_plan("mystery").name, "generic_network_fix");
    }
}
