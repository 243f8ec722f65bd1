//! In-memory task table with LRU eviction scoped to terminal tasks only.
//!
//! Non-terminal tasks are never eviction candidates, so only terminal task
//! ids are tracked in the recency list; touching a terminal task (e.g. a
//! status read after completion) moves it to the back, so idle terminal
//! tasks are evicted before recently-checked ones.

use std::collections::{HashMap, VecDeque};

use voice_agent_core::Task;

pub struct TaskTable {
    tasks: HashMap<String, Task>,
    terminal_lru: VecDeque<String>,
    capacity: usize,
}

impl TaskTable {
    pub fn new(capacity: usize) -> Self {
        Self { tasks: HashMap::new(), terminal_lru: VecDeque::new(), capacity }
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.id.clone(), task);
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Call after any mutation that may have entered or re-touched a terminal
    /// task. Evicts the oldest-touched terminal task(s) while over capacity.
    pub fn touch(&mut self, id: &str) {
        let is_terminal = self.tasks.get(id).map(|t| t.phase.is_terminal()).unwrap_or(false);
        if is_terminal {
            if let Some(pos) = self.terminal_lru.iter().position(|x| x == id) {
                self.terminal_lru.remove(pos);
            }
            self.terminal_lru.push_back(id.to_string());
        }
        self.evict_if_needed();
    }

    fn evict_if_needed(&mut self) {
        while self.tasks.len() > self.capacity {
            let Some(victim) = self.terminal_lru.pop_front() else {
                break;
            };
            self.tasks.remove(&victim);
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn count_in_phase(&self, phase: voice_agent_core::TaskPhase) -> usize {
        self.tasks.values().filter(|t| t.phase == phase).count()
    }

    pub fn values(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::{ErrorKind, TaskPhase};

    fn terminal_task(id: &str) -> Task {
        let mut t = Task::new(id.to_string(), "hi".into());
        t.mark_failed(ErrorKind::BackendFailed, "x");
        t
    }

    #[test]
    fn non_terminal_tasks_are_never_evicted() {
        let mut table = TaskTable::new(2);
        table.insert(Task::new("running".into(), "hi".into()));
        table.touch("running");
        table.insert(terminal_task("done"));
        table.touch("done");
        // capacity 2: "running" (non-terminal) + "done" fit exactly.
        // Inserting another terminal task must evict "done", never "running".
        table.insert(terminal_task("done2"));
        table.touch("done2");
        assert!(table.get("running").is_some());
        assert!(table.get("done").is_none());
        assert!(table.get("done2").is_some());
    }

    #[test]
    fn touching_a_terminal_task_renews_its_recency() {
        let mut table = TaskTable::new(1);
        table.insert(terminal_task("a"));
        table.touch("a");
        table.insert(terminal_task("b"));
        table.touch("b");
        // "a" already evicted since capacity is 1 and "b" is newer.
        assert!(table.get("a").is_none());
        assert!(table.get("b").is_some());
    }

    #[test]
    fn count_in_phase_matches_inserted_tasks() {
        let mut table = TaskTable::new(10);
        table.insert(Task::new("a".into(), "hi".into()));
        table.insert(Task::new("b".into(), "hi".into()));
        assert_eq!(table.count_in_phase(TaskPhase::Accepted), 2);
    }
}
