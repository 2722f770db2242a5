use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use sandbox_status_error::SandboxError;

/// Source of the currently provisioned sandbox session.
///
/// The provisioning side owns writes; status reporting only ever calls
/// [`SessionSource::current`].
pub trait SessionSource: Debug + Send + Sync {
    fn current(&self) -> Result<Option<SandboxSession>, SandboxError>;
}

/// File paths written into a sandbox, shared between the provisioner and readers.
#[derive(Debug, Clone, Default)]
pub struct TrackedFiles {
    inner: Arc<RwLock<BTreeSet<String>>>,
}

impl TrackedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>) -> Result<bool, SandboxError> {
        let mut files = self.inner.write().map_err(|_| poisoned("tracked files"))?;
        Ok(files.insert(path.into()))
    }

    pub fn remove(&self, path: &str) -> Result<bool, SandboxError> {
        let mut files = self.inner.write().map_err(|_| poisoned("tracked files"))?;
        Ok(files.remove(path))
    }

    pub fn clear(&self) -> Result<(), SandboxError> {
        let mut files = self.inner.write().map_err(|_| poisoned("tracked files"))?;
        files.clear();
        Ok(())
    }

    /// Sorted copy of the tracked paths.
    pub fn snapshot(&self) -> Result<Vec<String>, SandboxError> {
        let files = self.inner.read().map_err(|_| poisoned("tracked files"))?;
        Ok(files.iter().cloned().collect())
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let inner = self.inner.clone();
        let _ = std::thread::spawn(move || {
            let _guard = inner.write().expect("lock tracked files");
            panic!("poison tracked files");
        })
        .join();
    }
}

#[derive(Debug, Clone)]
pub struct SandboxSession {
    sandbox_id: String,
    url: String,
    files: TrackedFiles,
}

impl SandboxSession {
    pub fn new(sandbox_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            sandbox_id: sandbox_id.into(),
            url: url.into(),
            files: TrackedFiles::new(),
        }
    }

    pub fn with_files(mut self, files: TrackedFiles) -> Self {
        self.files = files;
        self
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn files(&self) -> &TrackedFiles {
        &self.files
    }
}

/// In-process holder for at most one live sandbox session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slot: RwLock<Option<SandboxSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `session`, returning the one it replaced.
    pub fn install(&self, session: SandboxSession) -> Result<Option<SandboxSession>, SandboxError> {
        let mut slot = self.slot.write().map_err(|_| poisoned("session registry"))?;
        let previous = slot.replace(session);
        if let Some(previous) = previous.as_ref() {
            tracing::info!(sandbox_id = previous.sandbox_id(), "replaced cached sandbox session");
        }
        Ok(previous)
    }

    pub fn release(&self) -> Result<Option<SandboxSession>, SandboxError> {
        let mut slot = self.slot.write().map_err(|_| poisoned("session registry"))?;
        Ok(slot.take())
    }
}

impl SessionSource for SessionRegistry {
    fn current(&self) -> Result<Option<SandboxSession>, SandboxError> {
        let slot = self.slot.read().map_err(|_| poisoned("session registry"))?;
        Ok(slot.clone())
    }
}

fn poisoned(what: &str) -> SandboxError {
    SandboxError::StateUnavailable {
        message: format!("{what} lock poisoned"),
    }
}
