//! Pipeline orchestration.
//!
//! ```text
//!   generator ──> store ──> publisher (new_flow)
//!       │
//!       └─ anomalous ──> rules ─┐
//!                               ├──> stage-1 response ──> stage-2 response
//!                 netcheck ─────┘
//! ```
//!
//! One background task generates batches on a randomized interval until its
//! cancellation token fires. Cancellation is observed between batches only,
//! so an in-flight batch always completes. A failing unit is logged and
//! skipped; a failing batch kills the loop and flips the liveness flag so
//! the status surface shows the degradation instead of hiding it.

use crate::config::PipelineConfig;
use crate::decision::DecisionSource;
use crate::error::{LifecycleError, PipelineError};
use crate::generator::FlowGenerator;
use crate::publisher::{Publisher, PushEvent};
use crate::rca::{rules, HealthProbe};
use crate::record::{mint_id, Features, FlowRecord, Verdict};
use crate::response::ResponseExecutor;
use crate::state::{PipelineRegistry, RunState};
use crate::store::RecordStore;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of one generated or ingested batch.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    pub flows: usize,
    pub anomalies: usize,
    pub failures: usize,
}

/// Raw flow row accepted on the file-ingest path, one JSON object per line.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFlowRow {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    #[serde(default)]
    pub features: Features,
}

pub struct Pipeline {
    registry: Arc<PipelineRegistry>,
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn Publisher>,
    decisions: Arc<dyn DecisionSource>,
    generator: FlowGenerator,
    probe: HealthProbe,
    executor: ResponseExecutor,
    config: PipelineConfig,
    loop_task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn Publisher>,
        decisions: Arc<dyn DecisionSource>,
        config: PipelineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(PipelineRegistry::new()),
            store: store.clone(),
            publisher: publisher.clone(),
            decisions: decisions.clone(),
            generator: FlowGenerator::new(decisions.clone(), &config),
            probe: HealthProbe::new(decisions.clone()),
            executor: ResponseExecutor::new(store, publisher, decisions, config.clone()),
            config,
            loop_task: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    /// Start the background generation loop.
    pub fn start(self: &Arc<Self>) -> Result<(), LifecycleError> {
        // The registry transition and the task slot swap form one critical
        // section, so a concurrent stop() cannot land between them and
        // cancel the loop we are about to store.
        {
            let mut slot = self.loop_task.lock().unwrap();
            self.registry.start()?;
            let token = CancellationToken::new();
            let task = tokio::spawn(Arc::clone(self).generation_loop(token.clone()));
            *slot = Some((token, task));
        }

        info!("pipeline started");
        self.publisher.broadcast(PushEvent::SystemStatus {
            state: "running".to_string(),
            message: "pipeline started".to_string(),
        });
        Ok(())
    }

    /// Stop the loop. The current batch finishes; we wait a bounded grace
    /// period for the task to wind down.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        // Same critical section as start(): the slot must be taken under
        // the lock that covers the registry transition. Neither registry
        // call awaits; the guard is gone before the join below.
        let handle = {
            let mut slot = self.loop_task.lock().unwrap();
            self.registry.stop()?;
            slot.take()
        };
        if let Some((token, task)) = handle {
            token.cancel();
            if tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .is_err()
            {
                warn!("generation loop did not stop within grace period");
            }
        }

        info!("pipeline stopped");
        self.publisher.broadcast(PushEvent::SystemStatus {
            state: "stopped".to_string(),
            message: "pipeline stopped".to_string(),
        });
        Ok(())
    }

    async fn generation_loop(self: Arc<Self>, token: CancellationToken) {
        info!("generation loop active");
        loop {
            if token.is_cancelled() {
                break;
            }

            match self.run_batch().await {
                Ok(summary) => {
                    self.publisher
                        .broadcast(PushEvent::StatsUpdate(self.statistics().await));
                    info!(
                        flows = summary.flows,
                        anomalies = summary.anomalies,
                        failures = summary.failures,
                        "batch complete"
                    );
                }
                Err(err) => {
                    // A batch-level failure is fatal for the loop. Surface
                    // it instead of spinning on a broken pipeline.
                    error!(error = %err, "generation loop died");
                    self.registry.mark_loop_dead();
                    self.publisher.broadcast(PushEvent::SystemStatus {
                        state: "degraded".to_string(),
                        message: format!("generation loop died: {err}"),
                    });
                    break;
                }
            }

            let wait = self
                .decisions
                .int_in(self.config.batch_interval_secs.clone());
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(wait)) => {}
            }
        }
        info!("generation loop exited");
    }

    /// Generate and process one batch. Unit failures are isolated.
    pub async fn run_batch(&self) -> Result<BatchSummary, PipelineError> {
        let size = self.decisions.int_in(self.config.batch_size.clone()) as u32;
        let batch = self.generator.generate_batch(size);

        let mut summary = BatchSummary {
            flows: batch.len(),
            ..Default::default()
        };

        for flow in batch {
            let anomalous = flow.verdict.is_anomalous();
            if let Err(err) = self.process_flow(flow).await {
                warn!(error = %err, "flow processing failed, continuing batch");
                summary.failures += 1;
            } else if anomalous {
                summary.anomalies += 1;
            }
        }
        Ok(summary)
    }

    /// Persist one flow, announce it, and fan out RCA if anomalous.
    async fn process_flow(&self, flow: FlowRecord) -> Result<(), PipelineError> {
        self.store.create_flow(flow.clone()).await?;
        self.publisher.broadcast(PushEvent::NewFlow(flow.clone()));

        if flow.verdict.is_anomalous() {
            self.run_rca(&flow).await;
        }
        Ok(())
    }

    /// Both classification stages run for every anomalous flow; each feeds
    /// the executor only when it assigned a category. Stage 2 remediation
    /// needs the stage-1 row and reports ResponseNotFound without it.
    async fn run_rca(&self, flow: &FlowRecord) {
        let rule_category = rules::classify(&flow.features, &self.config.thresholds);
        let (target, health_category) = self.probe.probe(flow);

        info!(
            flow_id = %flow.id,
            rule = rule_category.map(|c| c.as_str()).unwrap_or("none"),
            health = health_category.map(|c| c.as_str()).unwrap_or("none"),
            device = %target.name,
            "rca fan-out"
        );

        if let Some(category) = rule_category {
            if let Err(err) = self.executor.execute_stage1(flow, category).await {
                warn!(flow_id = %flow.id, error = %err, "stage-1 response failed");
            }
        }

        if let Some(category) = health_category {
            if let Err(err) = self.executor.execute_stage2(&flow.id, category).await {
                warn!(flow_id = %flow.id, error = %err, "stage-2 response failed");
            }
        }
    }

    /// Generate a single batch on demand, independent of the loop.
    pub async fn generate_once(&self) -> Result<BatchSummary, PipelineError> {
        let summary = self.run_batch().await?;
        self.publisher
            .broadcast(PushEvent::StatsUpdate(self.statistics().await));
        Ok(summary)
    }

    /// File-based batch path: read raw flow rows (JSON Lines), persist them
    /// as normal, then let the verdict source flag a fraction anomalous and
    /// fan those out to RCA.
    pub async fn ingest_file(&self, path: &str) -> Result<BatchSummary, PipelineError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| PipelineError::BatchRead {
                    path: path.to_string(),
                    source,
                })?;

        let mut summary = BatchSummary::default();

        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: RawFlowRow =
                serde_json::from_str(line).map_err(|source| PipelineError::BatchParse {
                    line: idx + 1,
                    source,
                })?;

            let flow = FlowRecord {
                id: mint_id("flow"),
                timestamp: Utc::now(),
                src_ip: row.src_ip,
                dst_ip: row.dst_ip,
                src_port: row.src_port,
                dst_port: row.dst_port,
                verdict: Verdict::Normal,
                features: row.features,
            };
            let id = flow.id.clone();
            summary.flows += 1;

            if let Err(err) = self.process_flow(flow).await {
                warn!(error = %err, "ingested flow failed, continuing");
                summary.failures += 1;
                continue;
            }

            // Detection model stand-in: weighted coin over persisted rows.
            if self.decisions.chance(self.config.anomaly_probability) {
                match self.store.set_verdict(&id, Verdict::Anomalous).await {
                    Ok(flagged) => {
                        summary.anomalies += 1;
                        self.run_rca(&flagged).await;
                    }
                    Err(err) => {
                        warn!(flow_id = %id, error = %err, "verdict update failed");
                        summary.failures += 1;
                    }
                }
            }
        }

        info!(
            path,
            rows = summary.flows,
            anomalies = summary.anomalies,
            "batch file ingested"
        );
        self.publisher.broadcast(PushEvent::BatchIngested {
            source: path.to_string(),
            rows: summary.flows,
            anomalies: summary.anomalies,
        });
        Ok(summary)
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Stats snapshot for the status surface and push updates.
    pub async fn statistics(&self) -> serde_json::Value {
        let counts = self.store.counts().await;
        let anomaly_rate = if counts.total_flows > 0 {
            (counts.total_anomalies as f64 / counts.total_flows as f64) * 100.0
        } else {
            0.0
        };
        let success_rate = if counts.total_responses > 0 {
            (counts.successful_responses as f64 / counts.total_responses as f64) * 100.0
        } else {
            0.0
        };

        json!({
            "total_events": counts.total_flows,
            "total_anomalies": counts.total_anomalies,
            "total_responses": counts.total_responses,
            "anomaly_rate": (anomaly_rate * 100.0).round() / 100.0,
            "success_rate": (success_rate * 10.0).round() / 10.0,
            "state": self.registry.state(),
            "loop_alive": self.registry.loop_alive(),
            "uptime": self.registry.uptime_secs(),
            "start_time": self.registry.started_at(),
            "last_update": Utc::now(),
        })
    }

    /// Last-hour activity and top talkers for the metrics surface.
    pub async fn metrics(&self) -> serde_json::Value {
        let one_hour_ago = Utc::now() - ChronoDuration::hours(1);
        let (recent_events, recent_anomalies) = self.store.flow_counts_since(one_hour_ago).await;
        let top = self.store.top_sources(5).await;

        json!({
            "recent_events": recent_events,
            "recent_anomalies": recent_anomalies,
            "top_ips": top
                .into_iter()
                .map(|(ip, count)| json!({"ip": ip, "count": count}))
                .collect::<Vec<_>>(),
        })
    }

    pub fn run_state(&self) -> RunState {
        self.registry.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::SeededDecisions;
    use crate::publisher::NullPublisher;
    use crate::store::{FlowFilter, MemoryStore};

    fn pipeline(seed: u64) -> (Arc<MemoryStore>, Arc<Pipeline>) {
        let store = Arc::new(MemoryStore::new());
        let p = Pipeline::new(
            store.clone(),
            Arc::new(NullPublisher),
            Arc::new(SeededDecisions::new(seed)),
            PipelineConfig::instant(),
        );
        (store, p)
    }

    #[tokio::test]
    async fn batch_persists_complete_flows() {
        let (store, p) = pipeline(1);
        let summary = p.generate_once().await.unwrap();
        assert!(summary.flows >= 3 && summary.flows <= 8);
        assert_eq!(summary.failures, 0);

        let page = store.list_flows(FlowFilter::default(), 1, 50).await;
        assert_eq!(page.total, summary.flows);
        for flow in &page.items {
            assert!(flow.features.is_complete());
        }
    }

    #[tokio::test]
    async fn anomalous_flows_get_responses() {
        let (store, p) = pipeline(7);
        // Enough batches that some anomalies classify into a rule category.
        for _ in 0..30 {
            p.generate_once().await.unwrap();
        }
        let counts = store.counts().await;
        assert!(counts.total_anomalies > 0);
        assert!(counts.total_responses > 0);
        // Responses only exist for anomalous flows.
        assert!(counts.total_responses <= counts.total_anomalies);
    }

    #[tokio::test]
    async fn statistics_reflect_store_and_state() {
        let (_store, p) = pipeline(3);
        p.generate_once().await.unwrap();

        let stats = p.statistics().await;
        assert!(stats["total_events"].as_u64().unwrap() > 0);
        assert_eq!(stats["state"], "stopped");
        assert_eq!(stats["loop_alive"], true);
        assert!(stats["start_time"].is_null());
        assert_eq!(stats["uptime"], 0.0);
    }

    #[tokio::test]
    async fn lifecycle_enforced() {
        let (_store, p) = pipeline(4);
        p.start().unwrap();
        assert_eq!(p.start().unwrap_err(), LifecycleError::AlreadyRunning);
        p.stop().await.unwrap();
        assert_eq!(p.stop().await.unwrap_err(), LifecycleError::NotRunning);
    }

    #[tokio::test]
    async fn concurrent_start_stop_never_strands_the_loop() {
        // Whatever order racing start/stop calls land in, the registry and
        // the task slot must agree: running implies a live loop task.
        let (_store, p) = pipeline(10);
        for _ in 0..50 {
            p.start().ok();

            let stopper = {
                let p = Arc::clone(&p);
                tokio::spawn(async move {
                    p.stop().await.ok();
                })
            };
            let starter = {
                let p = Arc::clone(&p);
                tokio::spawn(async move {
                    p.start().ok();
                })
            };
            let (a, b) = tokio::join!(stopper, starter);
            a.unwrap();
            b.unwrap();

            assert_eq!(
                p.registry().is_running(),
                p.loop_task.lock().unwrap().is_some(),
                "registry and loop task slot disagree"
            );

            if p.registry().is_running() {
                p.stop().await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn ingest_reads_json_lines() {
        let (store, p) = pipeline(5);

        let dir = std::env::temp_dir().join(format!("anbd-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("batch.jsonl");
        let mut lines = String::new();
        for i in 0..20 {
            lines.push_str(&format!(
                "{{\"src_ip\":\"192.168.10.{}\",\"dst_ip\":\"192.168.61.2\",\"src_port\":40000,\"dst_port\":443,\"features\":{{\"Flow Bytes/s\":2000000.0}}}}\n",
                (i % 250) + 1
            ));
        }
        std::fs::write(&path, lines).unwrap();

        let summary = p.ingest_file(path.to_str().unwrap()).await.unwrap();
        assert_eq!(summary.flows, 20);
        assert_eq!(summary.failures, 0);

        let counts = store.counts().await;
        assert_eq!(counts.total_flows, 20);
        // Verdicts were assigned by the weighted coin after persistence.
        assert_eq!(counts.total_anomalies, summary.anomalies);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn ingest_missing_file_is_an_error() {
        let (_store, p) = pipeline(6);
        let result = p.ingest_file("/nonexistent/batch.jsonl").await;
        assert!(matches!(result, Err(PipelineError::BatchRead { .. })));
    }

    #[tokio::test]
    async fn ingest_malformed_row_reports_line() {
        let (_store, p) = pipeline(8);
        let dir = std::env::temp_dir();
        let path = dir.join(format!("anbd-bad-{}.jsonl", std::process::id()));
        std::fs::write(&path, "not json\n").unwrap();

        match p.ingest_file(path.to_str().unwrap()).await {
            Err(PipelineError::BatchParse { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected parse error, got {other:?}"),
        }
        std::fs::remove_file(&path).ok();
    }
}
