//! Process-wide table of [`GpuSlot`]s. This is the **only** place a slot's
//! busy flag may be read or written — reserve, release and snapshot all take
//! the same [`parking_lot::Mutex`], so two concurrent reserves can never
//! return the same id and a release can never race a reserve into an
//! inconsistent state. The lock is held only for the scan/flip itself, never
//! across an `.await` (callers outside this crate never hold it at all).

use parking_lot::Mutex;
use tracing::warn;

use voice_agent_config::GpuTopology;
use voice_agent_core::{GpuSlot, GpuSnapshot};
use voice_agent_core::gpu_slot::Endpoint;
use voice_agent_core::traits::GpuRegistry as GpuRegistryTrait;

pub struct InMemoryGpuRegistry {
    slots: Mutex<Vec<GpuSlot>>,
}

impl InMemoryGpuRegistry {
    pub fn new(topology: &GpuTopology) -> Self {
        let slots = topology
            .0
            .iter()
            .map(|cfg| {
                GpuSlot::new(
                    cfg.id,
                    Endpoint { host: cfg.host.clone(), port: cfg.inference_port },
                    Endpoint { host: cfg.host.clone(), port: cfg.tts_port },
                    cfg.staging_dir.clone(),
                )
            })
            .collect();
        Self { slots: Mutex::new(slots) }
    }

    pub fn slot_staging_dir(&self, gpu_id: u32) -> Option<std::path::PathBuf> {
        self.slots.lock().iter().find(|s| s.id == gpu_id).map(|s| s.staging_dir.clone())
    }

    pub fn slot_endpoints(&self, gpu_id: u32) -> Option<(Endpoint, Endpoint)> {
        self.slots
            .lock()
            .iter()
            .find(|s| s.id == gpu_id)
            .map(|s| (s.inference.clone(), s.tts.clone()))
    }
}

impl GpuRegistryTrait for InMemoryGpuRegistry {
    fn reserve(&self, task_id: &str) -> Option<u32> {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if !slot.busy {
                slot.busy = true;
                slot.current_task = Some(task_id.to_string());
                return Some(slot.id);
            }
        }
        None
    }

    fn release(&self, gpu_id: u32, task_id: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|s| s.id == gpu_id) {
            if slot.current_task.as_deref() == Some(task_id) {
                slot.busy = false;
                slot.current_task = None;
            } else {
                warn!(
                    gpu_id,
                    task_id,
                    held_by = ?slot.current_task,
                    "release requested by a task that does not hold this slot, ignoring"
                );
            }
        }
    }

    fn reserve_many(&self, task_id: &str, n: usize) -> Vec<u32> {
        let mut slots = self.slots.lock();
        let mut reserved = Vec::with_capacity(n);
        for slot in slots.iter_mut() {
            if reserved.len() == n {
                break;
            }
            if !slot.busy {
                slot.busy = true;
                slot.current_task = Some(task_id.to_string());
                reserved.push(slot.id);
            }
        }
        reserved
    }

    fn snapshot(&self) -> Vec<GpuSnapshot> {
        self.slots.lock().iter().map(|s| s.snapshot(None)).collect()
    }

    fn force_release_all(&self) -> Vec<(u32, String)> {
        let mut slots = self.slots.lock();
        let mut released = Vec::new();
        for slot in slots.iter_mut() {
            if let Some(task_id) = slot.current_task.take() {
                released.push((slot.id, task_id));
            }
            slot.busy = false;
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_config::GpuSlotConfig;

    fn topology(n: u32) -> GpuTopology {
        GpuTopology(
            (0..n)
                .map(|id| GpuSlotConfig {
                    id,
                    host: "localhost".into(),
                    inference_port: 8390 + id as u16,
                    tts_port: 18182 + id as u16,
                    staging_dir: format!("/data/gpu{id}").into(),
                })
                .collect(),
        )
    }

    #[test]
    fn reserve_picks_lowest_free_id() {
        let reg = InMemoryGpuRegistry::new(&topology(3));
        assert_eq!(reg.reserve("t1"), Some(0));
        assert_eq!(reg.reserve("t2"), Some(1));
        assert_eq!(reg.reserve("t3"), Some(2));
        assert_eq!(reg.reserve("t4"), None);
    }

    #[test]
    fn release_frees_the_slot_for_its_own_task() {
        let reg = InMemoryGpuRegistry::new(&topology(1));
        reg.reserve("t1");
        reg.release(0, "t1");
        assert_eq!(reg.reserve("t2"), Some(0));
    }

    #[test]
    fn release_mismatch_leaves_slot_untouched() {
        let reg = InMemoryGpuRegistry::new(&topology(1));
        reg.reserve("t1");
        reg.release(0, "wrong-task");
        assert_eq!(reg.reserve("t2"), None);
    }

    #[test]
    fn reserve_many_returns_fewer_when_not_enough_free() {
        let reg = InMemoryGpuRegistry::new(&topology(3));
        reg.reserve("t0");
        let got = reg.reserve_many("t1", 3);
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn force_release_all_frees_every_busy_slot() {
        let reg = InMemoryGpuRegistry::new(&topology(2));
        reg.reserve("t1");
        reg.reserve("t2");
        let released = reg.force_release_all();
        assert_eq!(released.len(), 2);
        assert_eq!(reg.reserve("t3"), Some(0));
        assert_eq!(reg.reserve("t4"), Some(1));
    }
}
