//! GPU slot: one per physical accelerator, owned exclusively by the registry.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A host + port pair identifying an HTTP endpoint bound to one GPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}

/// One physical accelerator and the two backend processes bound to it.
///
/// Invariant: `busy == current_task.is_some()`. Mutated only inside the
/// registry's exclusion region (see `voice-agent-registry`).
#[derive(Debug, Clone)]
pub struct GpuSlot {
    pub id: u32,
    pub inference: Endpoint,
    pub tts: Endpoint,
    pub staging_dir: PathBuf,
    pub busy: bool,
    pub current_task: Option<String>,
    pub peak_memory_mb: Option<u64>,
}

impl GpuSlot {
    pub fn new(id: u32, inference: Endpoint, tts: Endpoint, staging_dir: PathBuf) -> Self {
        Self {
            id,
            inference,
            tts,
            staging_dir,
            busy: false,
            current_task: None,
            peak_memory_mb: None,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.busy
    }

    pub fn snapshot(&self, utilization_pct: Option<f32>) -> GpuSnapshot {
        GpuSnapshot {
            id: self.id,
            busy: self.busy,
            current_task: self.current_task.clone(),
            memory_used_mb: self.peak_memory_mb,
            utilization_pct,
            inference_port: self.inference.port,
            tts_port: self.tts.port,
        }
    }
}

/// Observability-facing point-in-time view of a [`GpuSlot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuSnapshot {
    pub id: u32,
    pub busy: bool,
    pub current_task: Option<String>,
    pub memory_used_mb: Option<u64>,
    pub utilization_pct: Option<f32>,
    pub inference_port: u16,
    pub tts_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> GpuSlot {
        GpuSlot::new(
            0,
            Endpoint { host: "localhost".into(), port: 8390 },
            Endpoint { host: "localhost".into(), port: 18182 },
            PathBuf::from("/data/gpu0"),
        )
    }

    #[test]
    fn fresh_slot_is_free() {
        let s = slot();
        assert!(s.is_free());
        assert_eq!(s.current_task, None);
    }

    #[test]
    fn endpoint_url_formats_host_and_port() {
        let e = Endpoint { host: "localhost".into(), port: 8390 };
        assert_eq!(e.url("/easy/submit"), "http://localhost:8390/easy/submit");
    }
}
