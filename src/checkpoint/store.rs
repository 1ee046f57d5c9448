use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::checkpoint::state_dict::StateDict;
use crate::error::{Result, TrainError};

/// Step and accuracy of a saved snapshot, kept in the safetensors header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointInfo {
    pub step: usize,
    pub test_acc: f64,
}

impl CheckpointInfo {
    fn to_metadata(self) -> HashMap<String, String> {
        HashMap::from([
            ("step".to_string(), self.step.to_string()),
            ("test_acc".to_string(), self.test_acc.to_string()),
        ])
    }

    fn from_metadata(meta: &HashMap<String, String>) -> Option<CheckpointInfo> {
        let step = meta.get("step")?.parse().ok()?;
        let test_acc = meta.get("test_acc")?.parse().ok()?;
        Some(CheckpointInfo { step, test_acc })
    }
}

/// One best snapshot per model name under `<root>/<model>/<model>.safetensors`.
///
/// Writes go to a temp file in the same directory and are renamed over the
/// previous artifact, so a reader never sees a half-written checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> CheckpointStore {
        CheckpointStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every artifact of `model_name`. Created on demand.
    pub fn model_dir(&self, model_name: &str) -> Result<PathBuf> {
        let dir = self.root.join(model_name);
        fs::create_dir_all(&dir).map_err(|e| TrainError::io(&dir, e))?;
        Ok(dir)
    }

    pub fn path(&self, model_name: &str) -> PathBuf {
        self.root
            .join(model_name)
            .join(format!("{}.safetensors", model_name))
    }

    pub fn save(&self, model_name: &str, state: &StateDict) -> Result<()> {
        self.write_state(model_name, state, None)
    }

    /// Like `save`, but records which step produced the snapshot.
    pub fn save_annotated(
        &self,
        model_name: &str,
        state: &StateDict,
        info: CheckpointInfo,
    ) -> Result<()> {
        self.write_state(model_name, state, Some(info.to_metadata()))
    }

    pub fn load(&self, model_name: &str) -> Result<StateDict> {
        let bytes = self.read(model_name)?;
        StateDict::from_safetensors(&bytes)
    }

    pub fn exists(&self, model_name: &str) -> bool {
        self.path(model_name).is_file()
    }

    /// Header annotation of the current snapshot; `None` for plain `save`s.
    pub fn info(&self, model_name: &str) -> Result<Option<CheckpointInfo>> {
        let bytes = self.read(model_name)?;
        let meta = StateDict::read_metadata(&bytes)?;
        Ok(CheckpointInfo::from_metadata(&meta))
    }

    /// Deletes the snapshot if there is one. Returns whether a file was removed.
    pub fn remove(&self, model_name: &str) -> Result<bool> {
        let path = self.path(model_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TrainError::io(path, e)),
        }
    }

    /// Writes `bytes` to `path` through a sibling temp file and an atomic rename.
    pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        CheckpointStore::write_atomic_with(path, |file| file.write_all(bytes))
    }

    /// `write` fills the temp file. If it fails, the temp file is deleted and
    /// whatever was at `path` stays untouched.
    fn write_atomic_with<F>(path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut fs::File) -> std::io::Result<()>,
    {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| TrainError::io(dir, e))?;
        write(tmp.as_file_mut()).map_err(|e| TrainError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| TrainError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| TrainError::io(path, e.error))?;
        Ok(())
    }

    fn read(&self, model_name: &str) -> Result<Vec<u8>> {
        let path = self.path(model_name);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TrainError::CheckpointNotFound {
                    model: model_name.to_string(),
                })
            }
            Err(e) => Err(TrainError::io(path, e)),
        }
    }

    fn write_state(
        &self,
        model_name: &str,
        state: &StateDict,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<()> {
        self.model_dir(model_name)?;
        let bytes = state.to_safetensors(metadata)?;
        let path = self.path(model_name);
        CheckpointStore::write_atomic(&path, &bytes)?;
        debug!(model = model_name, tensors = state.len(), bytes = bytes.len(), "checkpoint written");
        Ok(())
    }
}
