//! The container-visible `/code/data/...` convention, as a documented,
//! unit-tested pure-function contract rather than implicit filesystem IPC.

use std::path::{Path, PathBuf};

const CONTAINER_PREFIX: &str = "/code/data/";

/// Maps a host path that lives under `staging_dir` to the path the inference
/// container sees for the same file (container mounts `staging_dir` at
/// `/code/data`).
pub fn container_path_of(host_path: &Path, staging_dir: &Path) -> String {
    let rel = host_path.strip_prefix(staging_dir).unwrap_or(host_path);
    format!("{CONTAINER_PREFIX}{}", rel.to_string_lossy())
}

/// Inverse of [`container_path_of`]: strips the fixed container prefix (or a
/// leading `/`) and resolves the remainder under `staging_dir`.
pub fn host_path_of(container_path: &str, staging_dir: &Path) -> PathBuf {
    let rel = container_path
        .strip_prefix(CONTAINER_PREFIX)
        .or_else(|| container_path.strip_prefix('/'))
        .unwrap_or(container_path);
    staging_dir.join(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_under_fixed_prefix() {
        let staging_dir = Path::new("/data/gpu0");
        let host_path = staging_dir.join("t1-video.mp4");
        let container = container_path_of(&host_path, staging_dir);
        assert_eq!(container, "/code/data/t1-video.mp4");
        let back = host_path_of(&container, staging_dir);
        assert_eq!(back, host_path);
    }

    #[test]
    fn host_path_of_handles_backend_result_descriptor() {
        let staging_dir = Path::new("/data/gpu1");
        let resolved = host_path_of("/code/data/temp/t1-r.mp4", staging_dir);
        assert_eq!(resolved, PathBuf::from("/data/gpu1/temp/t1-r.mp4"));
    }

    #[test]
    fn host_path_of_tolerates_bare_leading_slash() {
        let staging_dir = Path::new("/data/gpu2");
        let resolved = host_path_of("/temp/t1-r.mp4", staging_dir);
        assert_eq!(resolved, PathBuf::from("/data/gpu2/temp/t1-r.mp4"));
    }
}
