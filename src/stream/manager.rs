//! Registry of supervised streams.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::command::TranscodeCommand;

use super::{
    start, start_with_command, StartError, StreamHandle, StreamSpec, StreamState,
    TerminationResult,
};

/// Error type for registry operations.
#[derive(thiserror::Error, Debug)]
pub enum ManagerError {
    /// No stream with the given id is registered.
    #[error("Stream not found: {id}")]
    StreamNotFound { id: Uuid },
}

/// Read-only snapshot row describing one registered stream.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub id: Uuid,
    pub state: StreamState,
    pub output_dir: PathBuf,
}

/// Registry of independently supervised streams.
///
/// Optional bookkeeping on top of [`start`]: every handle still
/// exclusively owns its subprocess, the registry only tracks handles for
/// introspection and bulk shutdown.
#[derive(Debug, Default)]
pub struct StreamManager {
    streams: Mutex<HashMap<Uuid, StreamHandle>>,
}

impl StreamManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a stream and register its handle.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] when the stream never reaches its serving
    /// state; nothing is registered in that case.
    pub async fn start(&self, spec: StreamSpec) -> Result<StreamHandle, StartError> {
        let handle = start(spec).await?;
        self.register(handle.clone()).await;
        Ok(handle)
    }

    /// Start a custom invocation and register its handle.
    ///
    /// # Errors
    ///
    /// See [`StreamManager::start`].
    pub async fn start_with_command(
        &self,
        spec: StreamSpec,
        command: TranscodeCommand,
    ) -> Result<StreamHandle, StartError> {
        let handle = start_with_command(spec, command).await?;
        self.register(handle.clone()).await;
        Ok(handle)
    }

    async fn register(&self, handle: StreamHandle) {
        self.streams.lock().await.insert(handle.id(), handle);
    }

    /// Look up a registered stream.
    pub async fn get(&self, id: Uuid) -> Option<StreamHandle> {
        self.streams.lock().await.get(&id).cloned()
    }

    /// Stop a stream and remove it from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::StreamNotFound`] for unknown ids.
    pub async fn stop(&self, id: Uuid) -> Result<TerminationResult, ManagerError> {
        let handle = self
            .streams
            .lock()
            .await
            .remove(&id)
            .ok_or(ManagerError::StreamNotFound { id })?;
        Ok(handle.stop().await)
    }

    /// Stop every registered stream. Returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let handles: Vec<StreamHandle> = self.streams.lock().await.drain().map(|(_, h)| h).collect();
        let count = handles.len();
        for handle in handles {
            let result = handle.stop().await;
            tracing::info!(stream = %handle.id(), outcome = ?result.outcome, "Stream shut down");
        }
        count
    }

    /// Read-only snapshot of all registered streams.
    pub async fn snapshot(&self) -> Vec<StreamInfo> {
        self.streams
            .lock()
            .await
            .values()
            .map(|handle| StreamInfo {
                id: handle.id(),
                state: handle.state(),
                output_dir: handle.output_dir().to_path_buf(),
            })
            .collect()
    }

    /// Number of registered streams.
    pub async fn len(&self) -> usize {
        self.streams.lock().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.streams.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry() {
        let manager = StreamManager::new();
        assert!(manager.is_empty().await);
        assert_eq!(manager.len().await, 0);
        assert!(manager.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_unknown_stream() {
        let manager = StreamManager::new();
        let id = Uuid::new_v4();
        let err = manager.stop(id).await.unwrap_err();
        assert!(matches!(err, ManagerError::StreamNotFound { id: e } if e == id));
    }

    #[tokio::test]
    async fn test_start_rejects_unresolved_source() {
        let manager = StreamManager::new();
        let temp = tempfile::TempDir::new().unwrap();
        let spec = StreamSpec::new("/no/such/input.mp4", temp.path().join("out"));

        let err = manager.start(spec).await.unwrap_err();
        assert!(matches!(err, StartError::Source(_)));
        assert!(manager.is_empty().await);
    }
}
