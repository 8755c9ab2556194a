use serde::{Deserialize, Serialize};
use std::fmt;

/// The two mutually exclusive GPU-resident model kinds (spec §1, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuModelKind {
    Image,
    Stt,
}

impl GpuModelKind {
    /// The opposite kind — used to look up the peer queue's backlog.
    pub fn other(self) -> GpuModelKind {
        match self {
            GpuModelKind::Image => GpuModelKind::Stt,
            GpuModelKind::Stt => GpuModelKind::Image,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GpuModelKind::Image => "image",
            GpuModelKind::Stt => "stt",
        }
    }

    /// The queue this kind's GPU-bound tasks are drawn from.
    pub fn queue_name(self) -> &'static str {
        match self {
            GpuModelKind::Image => crate::config::Q_IMAGE,
            GpuModelKind::Stt => crate::config::Q_STT,
        }
    }
}

impl fmt::Display for GpuModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{active_model, batch_count, last_activity_ts}` (spec §3 "GPU state").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuState {
    pub active_model: Option<GpuModelKind>,
    pub batch_count: u32,
    pub last_activity_ts: i64,
}

impl Default for GpuState {
    fn default() -> Self {
        Self {
            active_model: None,
            batch_count: 0,
            last_activity_ts: 0,
        }
    }
}

impl GpuState {
    /// Invariant check used by tests and by the arbiter after every mutation
    /// (spec §8 "Quantified invariants").
    pub fn invariant_holds(&self) -> bool {
        if self.active_model.is_none() && self.batch_count != 0 {
            return false;
        }
        self.batch_count <= crate::config::GPU_MAX_BATCH
    }
}
