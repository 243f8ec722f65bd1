use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use voice_agent_core::traits::GpuRegistry;
use voice_agent_core::{ErrorKind, Task, TaskPhase};

use crate::table::TaskTable;

/// A task just had a GPU reservation handed to it by the scheduler and is
/// ready for its pipeline driver to be spawned. The scheduler computes this
/// decision; the receiver owns the `tokio::spawn`.
#[derive(Debug, Clone)]
pub struct DispatchedTask {
    pub task_id: String,
    pub gpu_id: u32,
}

pub struct DispatchReceiver(pub mpsc::UnboundedReceiver<DispatchedTask>);

impl DispatchReceiver {
    pub async fn recv(&mut self) -> Option<DispatchedTask> {
        self.0.recv().await
    }
}

struct SchedulerState {
    table: TaskTable,
    wait_queue: VecDeque<String>,
}

/// Owns the task table and FIFO wait queue; delegates all GPU slot mutation
/// to the injected [`GpuRegistry`]. `wait_queue` and `table` always move
/// together under one lock so a concurrent `dispatch_next` and `enqueue` can
/// never observe a torn state.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    registry: Arc<dyn GpuRegistry>,
    dispatch_tx: mpsc::UnboundedSender<DispatchedTask>,
}

impl Scheduler {
    pub fn new(registry: Arc<dyn GpuRegistry>, task_table_capacity: usize) -> (Self, DispatchReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            state: Mutex::new(SchedulerState {
                table: TaskTable::new(task_table_capacity),
                wait_queue: VecDeque::new(),
            }),
            registry,
            dispatch_tx: tx,
        };
        (scheduler, DispatchReceiver(rx))
    }

    pub fn registry(&self) -> &Arc<dyn GpuRegistry> {
        &self.registry
    }

    pub fn create_task(&self, text: String) -> Task {
        let task = Task::new(voice_agent_core::new_task_id(), text);
        let mut state = self.state.lock();
        state.table.insert(task.clone());
        state.table.touch(&task.id);
        task
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        let mut state = self.state.lock();
        let found = state.table.get(id).cloned();
        if found.is_some() {
            state.table.touch(id);
        }
        found
    }

    pub fn set_phase(&self, id: &str, phase: TaskPhase) {
        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(id) {
            task.phase = phase;
            match phase {
                TaskPhase::Preprocessing => {}
                TaskPhase::Queued => task.timings.queued_at = Some(Utc::now()),
                TaskPhase::Reserving => task.timings.reserved_at = Some(Utc::now()),
                TaskPhase::Inference => task.timings.inference_started_at = Some(Utc::now()),
                _ => {}
            }
        }
        state.table.touch(id);
    }

    pub fn set_progress(&self, id: &str, pct: u8) {
        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(id) {
            task.progress_pct = pct;
        }
    }

    /// Records the resolved video/reference-audio paths a submission handler
    /// computed (from an explicit path, an avatar lookup, or the configured
    /// default) before the task is reserved or queued.
    pub fn set_inputs(&self, id: &str, video_path: Option<std::path::PathBuf>, reference_audio_path: Option<std::path::PathBuf>) {
        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(id) {
            task.video_path = video_path;
            task.reference_audio_path = reference_audio_path;
        }
        state.table.touch(id);
    }

    pub fn mark_tts_degraded(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(id) {
            task.tts_degraded = true;
        }
    }

    pub fn record_tts_ms(&self, id: &str, ms: u64) {
        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(id) {
            task.timings.tts_ms = Some(ms);
        }
    }

    pub fn record_inference_ms(&self, id: &str, ms: u64) {
        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(id) {
            task.timings.inference_ms = Some(ms);
        }
    }

    /// Called by the pipeline driver at step 2: reserve a GPU now, or join
    /// the FIFO wait queue and return `None` — a later `release_and_dispatch`
    /// elsewhere will resume this task from `Reserving`.
    pub fn reserve_or_queue(&self, task_id: &str) -> Option<u32> {
        if let Some(gpu_id) = self.registry.reserve(task_id) {
            let mut state = self.state.lock();
            if let Some(task) = state.table.get_mut(task_id) {
                task.gpu_id = Some(gpu_id);
                task.phase = TaskPhase::Reserving;
                task.timings.reserved_at = Some(Utc::now());
            }
            state.table.touch(task_id);
            return Some(gpu_id);
        }

        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(task_id) {
            task.phase = TaskPhase::Queued;
            task.timings.queued_at = Some(Utc::now());
        }
        state.wait_queue.push_back(task_id.to_string());
        state.table.touch(task_id);
        None
    }

    pub fn mark_failed(&self, id: &str, kind: ErrorKind, message: impl Into<String>) {
        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(id) {
            task.mark_failed(kind, message);
        }
        state.table.touch(id);
    }

    pub fn mark_timeout(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(id) {
            task.mark_timeout();
        }
        state.table.touch(id);
    }

    pub fn mark_completed(&self, id: &str, output_path: std::path::PathBuf, output_url: Option<String>) {
        let mut state = self.state.lock();
        if let Some(task) = state.table.get_mut(id) {
            task.phase = TaskPhase::Completed;
            task.progress_pct = 100;
            task.outcome.output_path = Some(output_path);
            task.outcome.output_url = output_url;
            task.timings.completed_at = Some(Utc::now());
        }
        state.table.touch(id);
    }

    /// Releases `gpu_id` (idempotent if already released) and attempts to
    /// dispatch as many queued tasks as there are now-free slots for.
    pub fn release_and_dispatch(&self, gpu_id: u32, task_id: &str) {
        self.registry.release(gpu_id, task_id);
        self.try_dispatch();
    }

    /// Drains as much of the wait queue as there is free GPU capacity for.
    /// Each successful reservation is sent on the dispatch channel; the
    /// receiver (owned by the pipeline crate) performs the actual spawn.
    pub fn try_dispatch(&self) {
        loop {
            let mut state = self.state.lock();
            let Some(front_id) = state.wait_queue.front().cloned() else {
                return;
            };
            let Some(gpu_id) = self.registry.reserve(&front_id) else {
                return;
            };
            state.wait_queue.pop_front();
            if let Some(task) = state.table.get_mut(&front_id) {
                task.gpu_id = Some(gpu_id);
                task.phase = TaskPhase::Reserving;
                task.timings.reserved_at = Some(Utc::now());
            }
            state.table.touch(&front_id);
            drop(state);

            if self.dispatch_tx.send(DispatchedTask { task_id: front_id, gpu_id }).is_err() {
                return;
            }
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.state.lock().wait_queue.len()
    }

    pub fn count_in_phase(&self, phase: TaskPhase) -> usize {
        self.state.lock().table.count_in_phase(phase)
    }

    /// Idempotent administrative reset: frees every busy slot and fails every
    /// currently non-terminal task with [`ErrorKind::AdminReset`].
    pub fn admin_reset(&self) {
        self.registry.force_release_all();
        let mut state = self.state.lock();
        let running: Vec<String> =
            state.table.values().filter(|t| !t.phase.is_terminal()).map(|t| t.id.clone()).collect();
        for id in &running {
            if let Some(task) = state.table.get_mut(id) {
                task.mark_failed(ErrorKind::AdminReset, "administrative reset");
            }
            state.table.touch(id);
        }
        state.wait_queue.clear();
        drop(state);
        self.try_dispatch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use voice_agent_core::gpu_slot::GpuSnapshot;

    struct FakeRegistry {
        slots: Mutex<StdHashMap<u32, Option<String>>>,
    }

    impl FakeRegistry {
        fn new(n: u32) -> Self {
            Self { slots: Mutex::new((0..n).map(|i| (i, None)).collect()) }
        }
    }

    impl GpuRegistry for FakeRegistry {
        fn reserve(&self, task_id: &str) -> Option<u32> {
            let mut slots = self.slots.lock();
            let mut ids: Vec<u32> = slots.keys().copied().collect();
            ids.sort();
            for id in ids {
                if slots[&id].is_none() {
                    slots.insert(id, Some(task_id.to_string()));
                    return Some(id);
                }
            }
            None
        }

        fn release(&self, gpu_id: u32, task_id: &str) {
            let mut slots = self.slots.lock();
            if slots.get(&gpu_id) == Some(&Some(task_id.to_string())) {
                slots.insert(gpu_id, None);
            }
        }

        fn reserve_many(&self, task_id: &str, n: usize) -> Vec<u32> {
            (0..n).filter_map(|_| self.reserve(task_id)).collect()
        }

        fn snapshot(&self) -> Vec<GpuSnapshot> {
            Vec::new()
        }

        fn force_release_all(&self) -> Vec<(u32, String)> {
            let mut slots = self.slots.lock();
            let mut out = Vec::new();
            for (id, holder) in slots.iter_mut() {
                if let Some(t) = holder.take() {
                    out.push((*id, t));
                }
            }
            out
        }
    }

    #[test]
    fn reserve_or_queue_queues_when_all_busy() {
        let (scheduler, _rx) = Scheduler::new(Arc::new(FakeRegistry::new(1)), 100);
        let t1 = scheduler.create_task("a".into());
        let t2 = scheduler.create_task("b".into());
        assert_eq!(scheduler.reserve_or_queue(&t1.id), Some(0));
        assert_eq!(scheduler.reserve_or_queue(&t2.id), None);
        assert_eq!(scheduler.queue_depth(), 1);
        assert_eq!(scheduler.get_task(&t2.id).unwrap().phase, TaskPhase::Queued);
    }

    #[tokio::test]
    async fn release_dispatches_the_queued_task() {
        let (scheduler, mut rx) = Scheduler::new(Arc::new(FakeRegistry::new(1)), 100);
        let t1 = scheduler.create_task("a".into());
        let t2 = scheduler.create_task("b".into());
        scheduler.reserve_or_queue(&t1.id);
        scheduler.reserve_or_queue(&t2.id);

        scheduler.release_and_dispatch(0, &t1.id);

        let dispatched = rx.recv().await.expect("dispatch message");
        assert_eq!(dispatched.task_id, t2.id);
        assert_eq!(dispatched.gpu_id, 0);
        assert_eq!(scheduler.queue_depth(), 0);
    }

    #[test]
    fn admin_reset_fails_running_tasks_and_frees_slots() {
        let (scheduler, _rx) = Scheduler::new(Arc::new(FakeRegistry::new(1)), 100);
        let t1 = scheduler.create_task("a".into());
        scheduler.reserve_or_queue(&t1.id);
        scheduler.set_phase(&t1.id, TaskPhase::Monitoring);

        scheduler.admin_reset();

        let task = scheduler.get_task(&t1.id).unwrap();
        assert_eq!(task.phase, TaskPhase::Failed);
        assert_eq!(task.outcome.error_kind, Some(ErrorKind::AdminReset));
    }
}
