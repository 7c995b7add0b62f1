// ============================================================
// Layer 6 — Filesystem Artifact Store
// ============================================================
// Persists ModelArtifactBundles so that readers only ever see a
// complete bundle.
//
// Layout under the store root:
//
//   CURRENT                      ← id of the served bundle
//   bundles/
//     <id>/                      ← never modified once current
//       model.bin                  Burn BinBytesRecorder bytes
//       vocabulary.json            WordLevel tokenizer JSON
//       label_space.json           ["sol0", "sol1", ...]
//       config.json                BundleConfig
//     .staging-<id>/             ← in-progress write, ignored by loads
//
// Saving is two steps:
//   1. stage:  write all four files into .staging-<id>, fsync,
//              then rename the directory to bundles/<id>
//   2. commit: replace CURRENT through a temp file + rename
//
// A failure anywhere in step 1 or before the rename in step 2
// leaves CURRENT pointing at the previous bundle, untouched.
// Each rename is followed by an fsync of the directory that holds
// the new entry.
//
// Saves and prunes within one process are serialised by the store
// lock, so a prune never sees a bundle that is staged but not yet
// current.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use tempfile::NamedTempFile;

use crate::data::label_space::LabelSpace;
use crate::data::vocabulary::Vocabulary;
use crate::domain::bundle::{BundleConfig, ModelArtifactBundle};
use crate::domain::traits::ArtifactStore;
use crate::error::{PipelineError, Result};

pub const CURRENT_POINTER: &str = "CURRENT";
pub const MODEL_FILE: &str = "model.bin";
pub const VOCABULARY_FILE: &str = "vocabulary.json";
pub const LABEL_SPACE_FILE: &str = "label_space.json";
pub const CONFIG_FILE: &str = "config.json";

const BUNDLES_DIR: &str = "bundles";
const STAGING_PREFIX: &str = ".staging-";

/// A bundle written to its final directory but not yet current.
#[derive(Debug)]
struct StagedBundle {
    id:  String,
    dir: PathBuf,
}

pub struct FsArtifactStore {
    root: PathBuf,
    /// Held across stage + commit and across prune.
    lock: Mutex<()>,
}

impl FsArtifactStore {
    /// Open (or create) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let bundles = root.join(BUNDLES_DIR);
        fs::create_dir_all(&bundles).map_err(|e| PipelineError::io(&bundles, e))?;
        Ok(Self { root, lock: Mutex::new(()) })
    }

    fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bundles_dir(&self) -> PathBuf {
        self.root.join(BUNDLES_DIR)
    }

    /// Id of the served bundle, if any.
    pub fn current_id(&self) -> Result<Option<String>> {
        let pointer = self.root.join(CURRENT_POINTER);
        match fs::read_to_string(&pointer) {
            Ok(text) => {
                let id = text.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::io(pointer, e)),
        }
    }

    /// Directory of the served bundle, if any.
    pub fn current_dir(&self) -> Result<Option<PathBuf>> {
        Ok(self.current_id()?.map(|id| self.bundles_dir().join(id)))
    }

    /// Write `bundle` into its own directory without making it current.
    /// The bundle id is the training id recorded in its config.
    /// Callers hold the store lock.
    fn stage_bundle(&self, bundle: &ModelArtifactBundle) -> Result<StagedBundle> {
        bundle.check_consistency()?;
        let id = bundle_id(&bundle.config)?;
        let bundles = self.bundles_dir();
        let staging = bundles.join(format!("{STAGING_PREFIX}{id}"));
        let target  = bundles.join(&id);

        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| PipelineError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| PipelineError::io(&staging, e))?;

        let written = write_parts(&staging, bundle)
            .and_then(|_| fs::rename(&staging, &target).map_err(|e| PipelineError::io(&target, e)))
            .and_then(|_| sync_dir(&bundles));
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        tracing::debug!("Staged bundle {} at '{}'", id, target.display());
        Ok(StagedBundle { id, dir: target })
    }

    /// Make a staged bundle current by atomically replacing CURRENT.
    /// Callers hold the store lock.
    fn commit(&self, staged: StagedBundle) -> Result<()> {
        let pointer = self.root.join(CURRENT_POINTER);
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| PipelineError::io(&self.root, e))?;
        tmp.write_all(staged.id.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| PipelineError::io(tmp.path(), e))?;
        tmp.persist(&pointer).map_err(|e| PipelineError::io(&pointer, e.error))?;
        sync_dir(&self.root)?;
        tracing::info!("Bundle {} is now current ('{}')", staged.id, staged.dir.display());
        Ok(())
    }

    fn read_bundle(dir: &Path) -> Result<ModelArtifactBundle> {
        let model_weights = read_part(dir, MODEL_FILE, "model")?;
        let vocabulary_json = read_text(dir, VOCABULARY_FILE, "vocabulary")?;
        let label_json = read_text(dir, LABEL_SPACE_FILE, "label_space")?;
        let config_json = read_text(dir, CONFIG_FILE, "config")?;

        let vocabulary = Vocabulary::from_json(&vocabulary_json)?;
        let label_space: LabelSpace = serde_json::from_str(&label_json)?;
        let config: BundleConfig = serde_json::from_str(&config_json)?;
        Ok(ModelArtifactBundle { model_weights, vocabulary, label_space, config })
    }
}

impl ArtifactStore for FsArtifactStore {
    fn load_bundle(&self) -> Result<Option<ModelArtifactBundle>> {
        match self.current_dir()? {
            Some(dir) => Self::read_bundle(&dir).map(Some),
            None => Ok(None),
        }
    }

    fn save_bundle(&self, bundle: &ModelArtifactBundle) -> Result<()> {
        let _guard = self.exclusive();
        let staged = self.stage_bundle(bundle)?;
        self.commit(staged)
    }

    fn delete_stale_bundles(&self) -> Result<usize> {
        let _guard = self.exclusive();
        let current = self.current_id()?;
        let bundles = self.bundles_dir();
        let mut removed = 0;
        for entry in fs::read_dir(&bundles).map_err(|e| PipelineError::io(&bundles, e))? {
            let entry = entry.map_err(|e| PipelineError::io(&bundles, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if current.as_deref() == Some(name.as_str()) {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(|e| PipelineError::io(&path, e))?;
                removed += 1;
                tracing::debug!("Removed stale bundle '{}'", path.display());
            }
        }
        Ok(removed)
    }
}

fn bundle_id(config: &BundleConfig) -> Result<String> {
    let id = config.training_id.trim();
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(id.to_string())
    } else {
        Err(PipelineError::ArtifactMismatch(format!(
            "training id {:?} cannot name a bundle directory",
            config.training_id
        )))
    }
}

/// Flush a directory entry change (rename, create) to disk.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| PipelineError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

fn write_parts(dir: &Path, bundle: &ModelArtifactBundle) -> Result<()> {
    write_file(&dir.join(MODEL_FILE), &bundle.model_weights)?;
    write_file(&dir.join(VOCABULARY_FILE), bundle.vocabulary.to_json()?.as_bytes())?;
    write_file(&dir.join(LABEL_SPACE_FILE), &serde_json::to_vec_pretty(&bundle.label_space)?)?;
    write_file(&dir.join(CONFIG_FILE), &serde_json::to_vec_pretty(&bundle.config)?)?;
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| PipelineError::io(path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| PipelineError::io(path, e))
}

fn read_part(dir: &Path, file: &str, part: &'static str) -> Result<Vec<u8>> {
    let path = dir.join(file);
    match fs::read(&path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PipelineError::ArtifactMissing { part, path })
        }
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

fn read_text(dir: &Path, file: &str, part: &'static str) -> Result<String> {
    let bytes = read_part(dir, file, part)?;
    String::from_utf8(bytes).map_err(|e| {
        PipelineError::ArtifactMismatch(format!("{part} is not valid UTF-8: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bundle::ARCHITECTURE_ID;

    fn bundle(training_id: &str, weights: &[u8]) -> ModelArtifactBundle {
        let vocabulary = Vocabulary::fit(["what is 2+2", "what is 3+3"], 100).unwrap();
        let label_space = LabelSpace::fit(["4", "6"]);
        ModelArtifactBundle {
            model_weights: weights.to_vec(),
            config: BundleConfig {
                max_sequence_length: 16,
                vocab_size: vocabulary.len(),
                embedding_dim: 8,
                hidden_dim: 4,
                dense_dim: 8,
                architecture_id: ARCHITECTURE_ID.to_string(),
                trained_at: "2026-01-01T00:00:00Z".to_string(),
                num_classes: label_space.len(),
                training_id: training_id.to_string(),
            },
            vocabulary,
            label_space,
        }
    }

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (e.file_name().to_string_lossy().into_owned(), fs::read(e.path()).unwrap())
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path()).unwrap();
        assert!(store.load_bundle().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path()).unwrap();
        store.save_bundle(&bundle("train_1_aaaa", &[1, 2, 3])).unwrap();

        let loaded = store.load_bundle().unwrap().unwrap();
        assert_eq!(loaded.model_weights, vec![1, 2, 3]);
        assert_eq!(loaded.config.training_id, "train_1_aaaa");
        assert_eq!(loaded.label_space.decode(1), Some("6"));
        loaded.check_consistency().unwrap();
    }

    #[test]
    fn test_failed_persist_leaves_previous_bundle_intact() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path()).unwrap();
        store.save_bundle(&bundle("train_1_aaaa", &[1, 2, 3])).unwrap();
        let current = store.current_dir().unwrap().unwrap();
        let before = snapshot(&current);

        // Occupy the target path with a file so the staging rename fails
        // after all four parts were written.
        fs::write(tmp.path().join("bundles").join("train_2_bbbb"), b"in the way").unwrap();
        let err = store.save_bundle(&bundle("train_2_bbbb", &[9, 9, 9])).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));

        assert_eq!(store.current_id().unwrap().as_deref(), Some("train_1_aaaa"));
        assert_eq!(snapshot(&current), before);
        let loaded = store.load_bundle().unwrap().unwrap();
        assert_eq!(loaded.model_weights, vec![1, 2, 3]);
        assert!(!tmp.path().join("bundles").join(".staging-train_2_bbbb").exists());
    }

    #[test]
    fn test_staged_but_uncommitted_bundle_is_not_served() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path()).unwrap();
        store.save_bundle(&bundle("train_1_aaaa", &[1])).unwrap();
        let staged = store.stage_bundle(&bundle("train_2_bbbb", &[2])).unwrap();
        assert!(staged.dir.join(MODEL_FILE).exists());

        assert_eq!(store.load_bundle().unwrap().unwrap().model_weights, vec![1]);
        store.commit(staged).unwrap();
        assert_eq!(store.load_bundle().unwrap().unwrap().model_weights, vec![2]);
    }

    #[test]
    fn test_missing_part_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path()).unwrap();
        store.save_bundle(&bundle("train_1_aaaa", &[1])).unwrap();
        let dir = store.current_dir().unwrap().unwrap();
        fs::remove_file(dir.join(LABEL_SPACE_FILE)).unwrap();

        let err = store.load_bundle().unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactMissing { part: "label_space", .. }));
    }

    #[test]
    fn test_delete_stale_bundles_keeps_current() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path()).unwrap();
        store.save_bundle(&bundle("train_1_aaaa", &[1])).unwrap();
        store.save_bundle(&bundle("train_2_bbbb", &[2])).unwrap();
        fs::create_dir_all(tmp.path().join("bundles").join(".staging-train_3_cccc")).unwrap();

        assert_eq!(store.delete_stale_bundles().unwrap(), 2);
        assert_eq!(store.load_bundle().unwrap().unwrap().model_weights, vec![2]);
    }

    #[test]
    fn test_prune_during_saves_never_orphans_current() {
        let tmp = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FsArtifactStore::new(tmp.path()).unwrap());
        store.save_bundle(&bundle("train_0_aaaa", &[0])).unwrap();

        let saver = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 1..=20u8 {
                    store.save_bundle(&bundle(&format!("train_{i}_aaaa"), &[i])).unwrap();
                }
            })
        };
        for _ in 0..50 {
            store.delete_stale_bundles().unwrap();
            let loaded = store.load_bundle().unwrap().unwrap();
            loaded.check_consistency().unwrap();
        }
        saver.join().unwrap();

        store.delete_stale_bundles().unwrap();
        assert_eq!(store.current_id().unwrap().as_deref(), Some("train_20_aaaa"));
        assert_eq!(store.load_bundle().unwrap().unwrap().model_weights, vec![20]);
        assert_eq!(fs::read_dir(tmp.path().join("bundles")).unwrap().count(), 1);
    }

    #[test]
    fn test_unsafe_training_id_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path()).unwrap();
        let err = store.save_bundle(&bundle("../escape", &[1])).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactMismatch(_)));
    }
}
