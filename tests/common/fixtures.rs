//! Observatory station layout and camera frame generators

use astrocam::config::{CONFIG_FILE, Config};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Frames for area `064`, listed out of chronological order
pub const AREA_064_FRAMES: [&str; 3] = [
    "064_2025-01-01_10-00-05.fts",
    "064_2025-01-01_09-59-55.fts",
    "064_2025-01-01_10-00-00.fts",
];

/// Minimal FITS-looking content for a frame
pub fn frame_bytes(name: &str) -> Vec<u8> {
    let mut bytes = format!("SIMPLE  =                    T / {name}").into_bytes();
    bytes.resize(2880, b' ');
    bytes
}

/// Temporary station: camera, processed and scratch directories under one root
pub struct Station {
    root: TempDir,
}

impl Station {
    /// Create a station with an empty camera directory
    pub fn new() -> Self {
        let root = TempDir::new().expect("create station root");
        std::fs::create_dir_all(root.path().join("data")).expect("create camera dir");
        Self { root }
    }

    /// Station root (stands in for the executable directory)
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Camera directory
    pub fn camera(&self) -> PathBuf {
        self.root().join("data")
    }

    /// Processed directory
    pub fn processed(&self) -> PathBuf {
        self.root().join("processed")
    }

    /// Scratch directory
    pub fn scratch(&self) -> PathBuf {
        self.root().join("temp")
    }

    /// Drop a frame into the camera directory
    pub fn capture(&self, name: &str) -> PathBuf {
        let path = self.camera().join(name);
        std::fs::write(&path, frame_bytes(name)).expect("write frame");
        path
    }

    /// Write `config.env` with the given lines and load it
    pub fn load_config(&self, lines: &[String]) -> Config {
        let path = self.root().join(CONFIG_FILE);
        std::fs::write(&path, lines.join("\n")).expect("write config.env");
        Config::from_env_file(&path, self.root()).expect("load config.env")
    }

    /// Sorted file names in a directory
    pub fn names_in(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .expect("read dir")
            .map(|e| {
                e.expect("dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}
