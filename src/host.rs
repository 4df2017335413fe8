//! The narrow message surface the interpreter and codec require from the
//! desktop shell. Everything rendered on screen — step lists, the
//! node-graph visualizer, the variable panel, overlays — subscribes to
//! interpreter callbacks and model events; the core itself is headless and
//! only reaches the outside world through this trait.

use async_trait::async_trait;

use crate::errors::HostErrorCode;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogResult {
    pub cancelled: bool,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReadResult {
    pub success: bool,
    pub data: Option<String>,
    pub code: Option<HostErrorCode>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWriteResult {
    pub success: bool,
    pub code: Option<HostErrorCode>,
    pub error: Option<String>,
}

/// The capabilities the interpreter and codec need from whatever hosts
/// them. A GUI shell backs this with real dialogs and a renderer process;
/// a headless caller (tests, the bundled CLI) backs it with something
/// much simpler.
#[async_trait]
pub trait HostBridge: Send + Sync {
    async fn open_file_dialog(&self) -> DialogResult;
    async fn save_file_dialog(&self, suggested_name: &str) -> DialogResult;
    async fn read_file(&self, path: &str) -> FileReadResult;
    async fn write_file(&self, path: &str, data: &str) -> FileWriteResult;
    /// Fire-and-forget; the host is expected to validate the URL scheme
    /// (http/https only) before acting on it.
    async fn open_external_link(&self, url: &str);
    /// Used to gate window-close and quit; answered however the host
    /// tracks unsaved edits.
    async fn check_dirty(&self) -> bool;
}

/// A headless, filesystem-backed `HostBridge` with no interactive shell
/// behind it. `open_file_dialog`/`save_file_dialog` resolve immediately
/// from a path supplied up front (there is no user to click through a
/// dialog), `check_dirty` always reports clean (there is no editor session
/// to track), and `open_external_link` only logs — there is no browser to
/// hand the URL to.
#[derive(Debug, Clone, Default)]
pub struct CliHostBridge {
    file_path: Option<String>,
}

impl CliHostBridge {
    pub fn new(file_path: Option<String>) -> Self {
        Self { file_path }
    }
}

#[async_trait]
impl HostBridge for CliHostBridge {
    async fn open_file_dialog(&self) -> DialogResult {
        match &self.file_path {
            Some(path) => DialogResult {
                cancelled: false,
                file_path: Some(path.clone()),
            },
            None => DialogResult {
                cancelled: true,
                file_path: None,
            },
        }
    }

    async fn save_file_dialog(&self, suggested_name: &str) -> DialogResult {
        match &self.file_path {
            Some(path) => DialogResult {
                cancelled: false,
                file_path: Some(path.clone()),
            },
            None => DialogResult {
                cancelled: false,
                file_path: Some(suggested_name.to_string()),
            },
        }
    }

    async fn read_file(&self, path: &str) -> FileReadResult {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => FileReadResult {
                success: true,
                data: Some(data),
                code: None,
                error: None,
            },
            Err(e) => FileReadResult {
                success: false,
                data: None,
                code: Some(HostErrorCode::from_io_error(&e)),
                error: Some(e.to_string()),
            },
        }
    }

    async fn write_file(&self, path: &str, data: &str) -> FileWriteResult {
        match tokio::fs::write(path, data).await {
            Ok(()) => FileWriteResult {
                success: true,
                code: None,
                error: None,
            },
            Err(e) => FileWriteResult {
                success: false,
                code: Some(HostErrorCode::from_io_error(&e)),
                error: Some(e.to_string()),
            },
        }
    }

    async fn open_external_link(&self, url: &str) {
        if url.starts_with("http://") || url.starts_with("https://") {
            tracing::info!(url, "would open external link (no desktop shell attached)");
        } else {
            tracing::warn!(url, "refusing to open external link with non-http(s) scheme");
        }
    }

    async fn check_dirty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_file_dialog_without_path_is_cancelled() {
        let bridge = CliHostBridge::new(None);
        let result = bridge.open_file_dialog().await;
        assert!(result.cancelled);
    }

    #[tokio::test]
    async fn read_file_maps_not_found_to_host_error_code() {
        let bridge = CliHostBridge::new(None);
        let result = bridge.read_file("/nonexistent/path/does-not-exist.json").await;
        assert!(!result.success);
        assert_eq!(result.code, Some(HostErrorCode::NotFound));
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_real_filesystem() {
        let bridge = CliHostBridge::new(None);
        let path = std::env::temp_dir().join(format!("flowrunner-host-test-{:p}.txt", &bridge));
        let path = path.to_string_lossy().to_string();

        let write_result = bridge.write_file(&path, "hello").await;
        assert!(write_result.success);

        let read_result = bridge.read_file(&path).await;
        assert!(read_result.success);
        assert_eq!(read_result.data.as_deref(), Some("hello"));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn check_dirty_is_always_false_headlessly() {
        let bridge = CliHostBridge::new(None);
        assert!(!bridge.check_dirty().await);
    }
}
