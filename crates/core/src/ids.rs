//! Task identity.
//!
//! Ids carry a millisecond timestamp plus a random suffix so that two tasks
//! accepted in the same clock millisecond never collide.

use rand::Rng;

/// Generates a new task id of the form `t<millis>-<6 hex chars>`.
pub fn new_task_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("t{millis:x}-{suffix:06x}")
}

/// Builds the sub-task code for the `index`-th chunk of `parent_task_id`.
pub fn chunk_code(parent_task_id: &str, index: usize) -> String {
    format!("{parent_task_id}-c{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| new_task_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn chunk_code_is_stable_and_indexed() {
        assert_eq!(chunk_code("t123-abc", 0), "t123-abc-c0");
        assert_eq!(chunk_code("t123-abc", 2), "t123-abc-c2");
    }
}
