//! Archive mount
//!
//! Zephyr loads scripts out of archive containers; a script is addressed by
//! a container-relative path, optionally qualified by the archive's name.
//! The debugger uses this interface to discover which archive holds a file,
//! to read script sources back to the client, and to checksum lumps.

use std::sync::Mutex;

/// Index of one file entry across all mounted containers.
pub type Lump = usize;

// ── ArchiveFs ────────────────────────────────────────────────────────────────

/// Read-only view of the mounted archive set.
///
/// Path lookups are case-insensitive, matching script identifier rules.
pub trait ArchiveFs: Send + Sync {
    /// Find a file by container-relative path.
    fn find_file(&self, path: &str) -> Option<Lump>;

    /// The container a lump belongs to.
    fn file_container(&self, lump: Lump) -> Option<usize>;

    /// Short name of a container (e.g. `game.zpk`).
    fn container_name(&self, container: usize) -> Option<String>;

    /// Full on-disk path of a container.
    fn container_path(&self, container: usize) -> Option<String>;

    /// Total number of file entries across all containers.
    fn entry_count(&self) -> usize;

    /// Container-relative path of a lump.
    fn file_full_name(&self, lump: Lump) -> Option<String>;

    /// Read a lump's bytes.
    fn read_file(&self, lump: Lump) -> Option<Vec<u8>>;

    /// CRC32 of a lump's contents.
    fn file_crc32(&self, lump: Lump) -> Option<u32>;
}

// ── MemoryFs ─────────────────────────────────────────────────────────────────

struct MemoryContainer {
    name: String,
    path: String,
    /// (container-relative path, contents)
    files: Vec<(String, Vec<u8>)>,
}

/// In-memory archive set for tests and standalone runs.
///
/// Lumps are numbered globally in mount order, containers in creation order.
#[derive(Default)]
pub struct MemoryFs {
    containers: Mutex<Vec<MemoryContainer>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a new container and return its index.
    pub fn add_container(&self, name: impl Into<String>, path: impl Into<String>) -> usize {
        let mut containers = self.containers.lock().unwrap();
        containers.push(MemoryContainer {
            name: name.into(),
            path: path.into(),
            files: Vec::new(),
        });
        containers.len() - 1
    }

    /// Add a file to a container.
    pub fn add_file(&self, container: usize, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        let mut containers = self.containers.lock().unwrap();
        containers[container].files.push((path.into(), contents.into()));
    }

    /// Resolve a global lump index to (container index, file index).
    fn locate(containers: &[MemoryContainer], lump: Lump) -> Option<(usize, usize)> {
        let mut base = 0;
        for (ci, container) in containers.iter().enumerate() {
            if lump < base + container.files.len() {
                return Some((ci, lump - base));
            }
            base += container.files.len();
        }
        None
    }
}

impl ArchiveFs for MemoryFs {
    fn find_file(&self, path: &str) -> Option<Lump> {
        let containers = self.containers.lock().unwrap();
        let mut index = 0;
        for container in containers.iter() {
            for (file_path, _) in &container.files {
                if file_path.eq_ignore_ascii_case(path) {
                    return Some(index);
                }
                index += 1;
            }
        }
        None
    }

    fn file_container(&self, lump: Lump) -> Option<usize> {
        let containers = self.containers.lock().unwrap();
        Self::locate(&containers, lump).map(|(ci, _)| ci)
    }

    fn container_name(&self, container: usize) -> Option<String> {
        let containers = self.containers.lock().unwrap();
        containers.get(container).map(|c| c.name.clone())
    }

    fn container_path(&self, container: usize) -> Option<String> {
        let containers = self.containers.lock().unwrap();
        containers.get(container).map(|c| c.path.clone())
    }

    fn entry_count(&self) -> usize {
        let containers = self.containers.lock().unwrap();
        containers.iter().map(|c| c.files.len()).sum()
    }

    fn file_full_name(&self, lump: Lump) -> Option<String> {
        let containers = self.containers.lock().unwrap();
        Self::locate(&containers, lump).map(|(ci, fi)| containers[ci].files[fi].0.clone())
    }

    fn read_file(&self, lump: Lump) -> Option<Vec<u8>> {
        let containers = self.containers.lock().unwrap();
        Self::locate(&containers, lump).map(|(ci, fi)| containers[ci].files[fi].1.clone())
    }

    fn file_crc32(&self, lump: Lump) -> Option<u32> {
        self.read_file(lump).map(|bytes| crc32fast::hash(&bytes))
    }
}
