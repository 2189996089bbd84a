//! Record persistence.
//!
//! `RecordStore` is the seam between the pipeline and storage; the shipped
//! implementation is an in-process store, which is all the demo platform
//! needs. The two write-path invariants live here: a flow verdict never
//! moves back from anomalous to normal, and a response's `success` flag
//! never returns to true once false.

use crate::error::StoreError;
use crate::record::{FlowRecord, ResponseRecord, Verdict};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Filters for flow listing. All present fields must match.
#[derive(Debug, Clone, Default)]
pub struct FlowFilter {
    pub verdict: Option<Verdict>,
    /// Substring match against source or destination address.
    pub ip: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

/// Filters for response listing.
#[derive(Debug, Clone, Default)]
pub struct ResponseFilter {
    /// Matches either stage's category.
    pub category: Option<String>,
    pub success: Option<bool>,
}

/// One page of query results, newest first.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

impl<T> Page<T> {
    pub fn page_count(&self) -> usize {
        if self.per_page == 0 {
            0
        } else {
            self.total.div_ceil(self.per_page)
        }
    }
}

/// Stage-2 patch applied to an existing response record.
#[derive(Debug, Clone)]
pub struct Stage2Patch {
    pub category: String,
    pub action: String,
    pub success: bool,
    pub duration_ms: u64,
}

/// Aggregate counters for status/stats payloads.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StoreCounts {
    pub total_flows: usize,
    pub total_anomalies: usize,
    pub total_responses: usize,
    pub successful_responses: usize,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_flow(&self, flow: FlowRecord) -> Result<(), StoreError>;

    async fn flow(&self, id: &str) -> Result<FlowRecord, StoreError>;

    /// Upgrade a flow's verdict. Anomalous is sticky: a downgrade request
    /// leaves the stored verdict untouched.
    async fn set_verdict(&self, id: &str, verdict: Verdict) -> Result<FlowRecord, StoreError>;

    async fn create_response(&self, response: ResponseRecord) -> Result<(), StoreError>;

    /// Latest response record created for a flow.
    async fn response_by_flow(&self, flow_id: &str) -> Result<ResponseRecord, StoreError>;

    /// Apply stage-2 results. The stored `success` flag becomes the
    /// conjunction of both stages.
    async fn apply_stage2(
        &self,
        flow_id: &str,
        patch: Stage2Patch,
    ) -> Result<ResponseRecord, StoreError>;

    async fn list_flows(
        &self,
        filter: FlowFilter,
        page: usize,
        per_page: usize,
    ) -> Page<FlowRecord>;

    async fn list_responses(
        &self,
        filter: ResponseFilter,
        page: usize,
        per_page: usize,
    ) -> Page<ResponseRecord>;

    async fn counts(&self) -> StoreCounts;

    /// Flows observed at or after `since`, split into (all, anomalous).
    async fn flow_counts_since(&self, since: DateTime<Utc>) -> (usize, usize);

    /// Most frequent source addresses, descending, at most `limit`.
    async fn top_sources(&self, limit: usize) -> Vec<(String, usize)>;
}

#[derive(Debug, Default)]
struct Tables {
    flows: Vec<FlowRecord>,
    flow_index: HashMap<String, usize>,
    responses: Vec<ResponseRecord>,
    /// flow_id -> index of the latest response row for that flow.
    response_index: HashMap<String, usize>,
}

/// In-process store. Insertion order is retained; listings paginate in
/// reverse insertion order so dashboards see newest records first.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(matched: Vec<&T>, page: usize, per_page: usize) -> Page<T> {
    let total = matched.len();
    let page = page.max(1);
    let start = (page - 1).saturating_mul(per_page);
    let items = matched
        .into_iter()
        .skip(start)
        .take(per_page)
        .cloned()
        .collect();
    Page {
        items,
        total,
        page,
        per_page,
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_flow(&self, flow: FlowRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        if tables.flow_index.contains_key(&flow.id) {
            return Err(StoreError::DuplicateId(flow.id));
        }
        let idx = tables.flows.len();
        tables.flow_index.insert(flow.id.clone(), idx);
        tables.flows.push(flow);
        Ok(())
    }

    async fn flow(&self, id: &str) -> Result<FlowRecord, StoreError> {
        let tables = self.tables.read().unwrap();
        tables
            .flow_index
            .get(id)
            .map(|&idx| tables.flows[idx].clone())
            .ok_or_else(|| StoreError::FlowNotFound(id.to_string()))
    }

    async fn set_verdict(&self, id: &str, verdict: Verdict) -> Result<FlowRecord, StoreError> {
        let mut tables = self.tables.write().unwrap();
        let idx = *tables
            .flow_index
            .get(id)
            .ok_or_else(|| StoreError::FlowNotFound(id.to_string()))?;
        let flow = &mut tables.flows[idx];
        // Anomalous is terminal.
        if flow.verdict != Verdict::Anomalous {
            flow.verdict = verdict;
        }
        Ok(flow.clone())
    }

    async fn create_response(&self, response: ResponseRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        let idx = tables.responses.len();
        tables
            .response_index
            .insert(response.flow_id.clone(), idx);
        tables.responses.push(response);
        Ok(())
    }

    async fn response_by_flow(&self, flow_id: &str) -> Result<ResponseRecord, StoreError> {
        let tables = self.tables.read().unwrap();
        tables
            .response_index
            .get(flow_id)
            .map(|&idx| tables.responses[idx].clone())
            .ok_or_else(|| StoreError::ResponseNotFound(flow_id.to_string()))
    }

    async fn apply_stage2(
        &self,
        flow_id: &str,
        patch: Stage2Patch,
    ) -> Result<ResponseRecord, StoreError> {
        let mut tables = self.tables.write().unwrap();
        let idx = *tables
            .response_index
            .get(flow_id)
            .ok_or_else(|| StoreError::ResponseNotFound(flow_id.to_string()))?;
        let response = &mut tables.responses[idx];
        response.category2 = Some(patch.category);
        response.action2 = Some(patch.action);
        response.duration_ms_stage2 = Some(patch.duration_ms);
        // Conjunction: a failed stage is never undone by a later success.
        response.success = response.success && patch.success;
        Ok(response.clone())
    }

    async fn list_flows(
        &self,
        filter: FlowFilter,
        page: usize,
        per_page: usize,
    ) -> Page<FlowRecord> {
        let tables = self.tables.read().unwrap();
        let matched: Vec<&FlowRecord> = tables
            .flows
            .iter()
            .rev()
            .filter(|flow| {
                filter.verdict.is_none_or(|v| flow.verdict == v)
                    && filter.ip.as_deref().is_none_or(|needle| {
                        flow.src_ip.contains(needle) || flow.dst_ip.contains(needle)
                    })
                    && filter.since.is_none_or(|since| flow.timestamp >= since)
            })
            .collect();
        paginate(matched, page, per_page)
    }

    async fn list_responses(
        &self,
        filter: ResponseFilter,
        page: usize,
        per_page: usize,
    ) -> Page<ResponseRecord> {
        let tables = self.tables.read().unwrap();
        let matched: Vec<&ResponseRecord> = tables
            .responses
            .iter()
            .rev()
            .filter(|response| {
                filter.category.as_deref().is_none_or(|needle| {
                    response.category1.as_deref() == Some(needle)
                        || response.category2.as_deref() == Some(needle)
                }) && filter.success.is_none_or(|s| response.success == s)
            })
            .collect();
        paginate(matched, page, per_page)
    }

    async fn counts(&self) -> StoreCounts {
        let tables = self.tables.read().unwrap();
        StoreCounts {
            total_flows: tables.flows.len(),
            total_anomalies: tables
                .flows
                .iter()
                .filter(|flow| flow.verdict.is_anomalous())
                .count(),
            total_responses: tables.responses.len(),
            successful_responses: tables
                .responses
                .iter()
                .filter(|response| response.success)
                .count(),
        }
    }

    async fn flow_counts_since(&self, since: DateTime<Utc>) -> (usize, usize) {
        let tables = self.tables.read().unwrap();
        let recent: Vec<&FlowRecord> = tables
            .flows
            .iter()
            .filter(|flow| flow.timestamp >= since)
            .collect();
        let anomalies = recent
            .iter()
            .filter(|flow| flow.verdict.is_anomalous())
            .count();
        (recent.len(), anomalies)
    }

    async fn top_sources(&self, limit: usize) -> Vec<(String, usize)> {
        let tables = self.tables.read().unwrap();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for flow in &tables.flows {
            *counts.entry(flow.src_ip.as_str()).or_default() += 1;
        }
        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(ip, count)| (ip.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }
}
