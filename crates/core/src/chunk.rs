//! Chunk: one time-sliced audio segment of a chunked-parallel task.

use std::path::PathBuf;

/// A parent task completes only once every [`Chunk`] is complete, or fails as
/// soon as any chunk terminally fails.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub audio_path: PathBuf,
    pub gpu_id: Option<u32>,
    pub code: String,
    pub output_path: Option<PathBuf>,
    pub complete: bool,
}

impl Chunk {
    pub fn new(index: usize, audio_path: PathBuf, code: String) -> Self {
        Self { index, audio_path, gpu_id: None, code, output_path: None, complete: false }
    }
}

/// True once every chunk in `chunks` is complete.
pub fn all_complete(chunks: &[Chunk]) -> bool {
    !chunks.is_empty() && chunks.iter().all(|c| c.complete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_complete_requires_every_chunk() {
        let mut chunks = vec![
            Chunk::new(0, "/tmp/a.wav".into(), "t1-c0".into()),
            Chunk::new(1, "/tmp/b.wav".into(), "t1-c1".into()),
        ];
        assert!(!all_complete(&chunks));
        chunks[0].complete = true;
        assert!(!all_complete(&chunks));
        chunks[1].complete = true;
        assert!(all_complete(&chunks));
    }

    #[test]
    fn empty_chunk_list_is_never_complete() {
        assert!(!all_complete(&[]));
    }
}
