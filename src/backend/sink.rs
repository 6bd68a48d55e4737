//! Keyval result file

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::common::{paths, Result};
use crate::guest::ResultSink;

/// Appends `key=value` lines to `<dir>/keyval`
#[derive(Debug, Clone)]
pub struct KeyvalFile {
    path: PathBuf,
}

impl KeyvalFile {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join("keyval"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for KeyvalFile {
    fn write_keyval(&mut self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            paths::ensure_dir(dir)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for (key, value) in values {
            writeln!(file, "{}={}", key, value)?;
        }
        Ok(())
    }
}
