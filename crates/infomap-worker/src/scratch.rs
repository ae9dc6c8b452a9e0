//! Per-job scratch directory.
//!
//! The engine reads its inputs from and writes its outputs to the working
//! directory, so every job gets a fresh temporary one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use infomap_core::{Error, Result};
use tempfile::TempDir;

/// Name the engine image is materialized under, inside the scratch directory.
const ENGINE_FILE: &str = if cfg!(windows) {
    "infomap-engine.dll"
} else if cfg!(target_os = "macos") {
    "libinfomap-engine.dylib"
} else {
    "libinfomap-engine.so"
};

pub struct Scratch {
    dir: TempDir,
    inputs: Vec<String>,
}

impl Scratch {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("infomap-job-").tempdir()?;
        Ok(Self {
            dir,
            inputs: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write an input file. Names must be plain file names.
    pub fn write_input(&mut self, name: &str, content: &str) -> Result<()> {
        let path = self.file_path(name)?;
        fs::write(&path, content)?;
        self.inputs.push(name.to_string());
        Ok(())
    }

    /// Write the engine image and return the path to load it from.
    pub fn write_engine(&self, image: &[u8]) -> Result<PathBuf> {
        if image.is_empty() {
            return Err(Error::Engine(
                "Execution context carries no engine image".to_string(),
            ));
        }
        let path = self.dir.path().join(ENGINE_FILE);
        fs::write(&path, image)?;
        Ok(path)
    }

    /// Read every file the run produced whose name starts with `out_name`.
    pub fn collect_outputs(&self, out_name: &str) -> Result<BTreeMap<String, String>> {
        let mut outputs = BTreeMap::new();
        for entry in fs::read_dir(self.dir.path())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(out_name) || name == ENGINE_FILE || self.inputs.contains(&name) {
                continue;
            }
            let bytes = fs::read(entry.path())?;
            outputs.insert(name, String::from_utf8_lossy(&bytes).into_owned());
        }
        Ok(outputs)
    }

    fn file_path(&self, name: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && name != ENGINE_FILE;
        if !plain {
            return Err(Error::Engine(format!("Invalid input filename '{}'", name)));
        }
        Ok(self.dir.path().join(name))
    }
}
