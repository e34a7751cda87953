// src/project/context.rs

//! Message sink handed to every project operation

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumString};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum MessageLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Answer to "an existing file would be overwritten"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum FileConflictAction {
    Overwrite,
    Ignore,
    OverwriteAll,
    IgnoreAll,
}

pub trait ProjectContext: Send + Sync {
    fn log(&self, level: MessageLevel, message: &str);

    /// Only consulted by packages-folder projects
    fn resolve_file_conflict(&self, _message: &str) -> FileConflictAction {
        FileConflictAction::Ignore
    }

    /// Called after a direct install whose package ships a readme
    fn open_readme(&self, _path: &Path) {}
}

/// Forwards everything to `tracing`
#[derive(Debug, Default, Clone)]
pub struct LoggingProjectContext {
    pub conflict_action: Option<FileConflictAction>,
}

impl LoggingProjectContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conflict_action(mut self, action: FileConflictAction) -> Self {
        self.conflict_action = Some(action);
        self
    }
}

impl ProjectContext for LoggingProjectContext {
    fn log(&self, level: MessageLevel, message: &str) {
        match level {
            MessageLevel::Debug => debug!("{}", message),
            MessageLevel::Info => info!("{}", message),
            MessageLevel::Warning => warn!("{}", message),
            MessageLevel::Error => error!("{}", message),
        }
    }

    fn resolve_file_conflict(&self, message: &str) -> FileConflictAction {
        let action = self.conflict_action.unwrap_or(FileConflictAction::Ignore);
        debug!("File conflict: {} -> {}", message, action);
        action
    }

    fn open_readme(&self, path: &Path) {
        info!("Package readme available at {}", path.display());
    }
}

/// Keeps every message in memory, for callers that report after the fact
#[derive(Debug, Default)]
pub struct RecordingProjectContext {
    messages: Mutex<Vec<(MessageLevel, String)>>,
    readmes: Mutex<Vec<PathBuf>>,
}

impl RecordingProjectContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(MessageLevel, String)> {
        self.messages.lock().clone()
    }

    pub fn messages_at(&self, level: MessageLevel) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn readmes(&self) -> Vec<PathBuf> {
        self.readmes.lock().clone()
    }
}

impl ProjectContext for RecordingProjectContext {
    fn log(&self, level: MessageLevel, message: &str) {
        self.messages.lock().push((level, message.to_string()));
    }

    fn open_readme(&self, path: &Path) {
        self.readmes.lock().push(path.to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_context() {
        let ctx = RecordingProjectContext::new();
        ctx.log(MessageLevel::Warning, "rolling back");
        ctx.log(MessageLevel::Info, "done");
        assert_eq!(ctx.messages().len(), 2);
        assert_eq!(ctx.messages_at(MessageLevel::Warning), vec!["rolling back"]);
        assert_eq!(ctx.resolve_file_conflict("x"), FileConflictAction::Ignore);
    }

    #[test]
    fn test_message_level_order() {
        assert!(MessageLevel::Error > MessageLevel::Warning);
        assert_eq!("warning".parse::<MessageLevel>().unwrap(), MessageLevel::Warning);
    }
}
