//! Lifecycle registry for the pipeline.
//!
//! One mutex guards the running flag together with the start instant, so
//! no observer can ever see "running" without a start time. Uptime is
//! derived, never stored, and reads as zero once stopped.

use crate::error::LifecycleError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
}

#[derive(Debug)]
struct Inner {
    running: bool,
    started_monotonic: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    /// Cleared when the generation loop dies on a fatal error.
    loop_alive: bool,
}

/// Thread-safe lifecycle state, shared via `Arc`.
#[derive(Debug)]
pub struct PipelineRegistry {
    inner: Mutex<Inner>,
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                running: false,
                started_monotonic: None,
                started_at: None,
                loop_alive: true,
            }),
        }
    }

    /// Mark the pipeline running. Fails when already active.
    pub fn start(&self) -> Result<DateTime<Utc>, LifecycleError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.running {
            return Err(LifecycleError::AlreadyRunning);
        }
        let now = Utc::now();
        inner.running = true;
        inner.started_monotonic = Some(Instant::now());
        inner.started_at = Some(now);
        inner.loop_alive = true;
        Ok(now)
    }

    /// Mark the pipeline stopped. Fails when not active.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.running {
            return Err(LifecycleError::NotRunning);
        }
        inner.running = false;
        inner.started_monotonic = None;
        inner.started_at = None;
        Ok(())
    }

    pub fn state(&self) -> RunState {
        if self.inner.lock().unwrap().running {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().running
    }

    /// Seconds since start while running, zero otherwise.
    pub fn uptime_secs(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        match (inner.running, inner.started_monotonic) {
            (true, Some(started)) => started.elapsed().as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Wall-clock start time, present only while running.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().unwrap();
        if inner.running { inner.started_at } else { None }
    }

    /// Record that the generation loop exited fatally.
    pub fn mark_loop_dead(&self) {
        self.inner.lock().unwrap().loop_alive = false;
    }

    pub fn loop_alive(&self) -> bool {
        self.inner.lock().unwrap().loop_alive
    }
}
