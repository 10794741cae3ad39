#![forbid(unsafe_code)]

//! JSON file persistence for the root object.
//!
//! The application loads its root object once at startup and saves it after
//! every committed write by installing [`persist_on_change`] as the root
//! scope's `onChange` hook.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | File absent | [`JsonFileStore::load`] yields an empty object |
//! | File holds a non-object | empty object (logged) |
//! | Malformed JSON / I/O error on load | [`BindError::Persist`] |
//! | Save fails inside the hook | logged with `warn!`; the write stands |

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bound_core::ObjectRef;

use crate::error::{BindError, Result};
use crate::func::Func;

/// A root object stored as one JSON document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored object.
    ///
    /// # Errors
    ///
    /// [`BindError::Persist`] when the file exists but cannot be read or
    /// parsed.
    pub fn load(&self) -> Result<ObjectRef> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no stored state; starting empty");
                return Ok(ObjectRef::new());
            }
            Err(err) => return Err(self.error("read", &err)),
        };
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|err| self.error("parse", &err))?;
        if !json.is_object() {
            tracing::warn!(path = %self.path.display(), "stored state is not an object; starting empty");
            return Ok(ObjectRef::new());
        }
        Ok(ObjectRef::from_json(&json))
    }

    /// Write `root`, replacing the stored document atomically.
    ///
    /// # Errors
    ///
    /// [`BindError::Persist`] on serialization or I/O failure.
    pub fn save(&self, root: &ObjectRef) -> Result<()> {
        let text =
            serde_json::to_string(&root.to_json()).map_err(|err| self.error("serialize", &err))?;
        let tmp = self.temp_path();
        fs::write(&tmp, text).map_err(|err| self.error("write", &err))?;
        fs::rename(&tmp, &self.path).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            self.error("rename", &err)
        })?;
        tracing::debug!(path = %self.path.display(), keys = root.len(), "state saved");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn error(&self, op: &str, err: &dyn std::fmt::Display) -> BindError {
        BindError::Persist(format!("{op} {}: {err}", self.path.display()))
    }
}

/// An `onChange` hook saving `root` to `store` after every commit.
#[must_use]
pub fn persist_on_change(store: JsonFileStore, root: ObjectRef) -> Func {
    Func::action(move |_| {
        if let Err(err) = store.save(&root) {
            tracing::warn!(%err, "failed to persist state");
        }
    })
}
