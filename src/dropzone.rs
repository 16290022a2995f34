//! Drop target admission: the checks a picker or drop gesture goes through before an import.
//!
//! Rejections surface as a transient message that expires [`MESSAGE_TIMEOUT`] after it was
//! raised. Expiry is tracked as state (raised-at instant) and evaluated against the `now`
//! supplied by the caller, so nothing here owns a timer.

use crate::config::Config;
use crate::importer::{ExclusivityFilter, SourceFile};
use std::time::{Duration, Instant};

/// How long a rejection message stays visible.
pub const MESSAGE_TIMEOUT: Duration = Duration::from_millis(2500);
/// Text shown when no message is active.
pub const PLACEHOLDER: &str = "Drag and drop to upload files, or click to choose";
/// Shown when several files are dropped on a single-file target.
pub const CHOOSE_SINGLE_FILE: &str = "Choose a single file";
/// Shown when no dropped file matches the allow-list.
pub const WRONG_FILE_TYPE: &str = "File type is incorrect";

/// Drop target settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropzoneConfig {
    /// Lowercased name suffixes a file must end with, e.g. `.json`. Empty accepts everything.
    pub accepted_types: Vec<String>,
    /// Ignore every gesture while set.
    pub locked: bool,
    /// Allow more than one file per gesture.
    pub multiple: bool,
}

impl DropzoneConfig {
    /// Build a config from a comma-separated allow-list such as `.txt,.md`.
    pub fn new(accepted_types: &str, multiple: bool) -> Self {
        Self {
            accepted_types: accepted_types
                .split(',')
                .map(|kind| kind.trim().to_lowercase())
                .filter(|kind| !kind.is_empty())
                .collect(),
            locked: false,
            multiple,
        }
    }

    /// Multi-file target using the configured allow-list.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.accepted_types, true)
    }

    /// Whether `name` passes the allow-list. Case-insensitive.
    pub fn accepts(&self, name: &str) -> bool {
        if self.accepted_types.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.accepted_types
            .iter()
            .any(|kind| name.ends_with(kind.as_str()))
    }
}

/// Receives the outcome of a gesture.
pub trait DropzoneHandler {
    /// Called with the admitted files, in gesture order.
    fn on_accept(&mut self, files: Vec<SourceFile>);
    /// Called when a gesture was rejected outright.
    fn on_reset(&mut self);
}

/// What a single gesture resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// The target is locked; nothing happened.
    Ignored,
    /// Nothing was accepted; carries the message raised.
    Rejected(&'static str),
    /// Files were handed to `on_accept`.
    Accepted {
        /// Files passed on.
        admitted: usize,
        /// Exclusive-format duplicates dropped from the gesture.
        discarded: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct TransientMessage {
    text: &'static str,
    raised_at: Instant,
}

/// Stateful drop target.
#[derive(Debug)]
pub struct Dropzone {
    config: DropzoneConfig,
    message: Option<TransientMessage>,
    accepted: Option<Vec<SourceFile>>,
}

impl Dropzone {
    /// Create an unlocked target with no message.
    pub fn new(config: DropzoneConfig) -> Self {
        Self {
            config,
            message: None,
            accepted: None,
        }
    }

    /// Current settings.
    pub fn config(&self) -> &DropzoneConfig {
        &self.config
    }

    /// Lock or unlock the target, e.g. while an import runs.
    pub fn set_locked(&mut self, locked: bool) {
        self.config.locked = locked;
    }

    /// Handle one drop or picker gesture observed at `now`.
    pub fn drop_files(
        &mut self,
        files: Vec<SourceFile>,
        now: Instant,
        handler: &mut dyn DropzoneHandler,
    ) -> DropOutcome {
        if self.config.locked {
            tracing::debug!(files = files.len(), "Drop ignored while locked");
            return DropOutcome::Ignored;
        }

        let too_many = !self.config.multiple && files.len() > 1;
        let passed: Vec<SourceFile> = if too_many {
            Vec::new()
        } else {
            files
                .into_iter()
                .filter(|file| self.config.accepts(file.name()))
                .collect()
        };

        if passed.is_empty() {
            let text = if too_many {
                CHOOSE_SINGLE_FILE
            } else {
                WRONG_FILE_TYPE
            };
            tracing::debug!(reason = text, "Drop rejected");
            self.message = Some(TransientMessage {
                text,
                raised_at: now,
            });
            self.accepted = None;
            handler.on_reset();
            return DropOutcome::Rejected(text);
        }

        let mut filter = ExclusivityFilter::new();
        let total = passed.len();
        let admitted: Vec<SourceFile> = passed
            .into_iter()
            .filter(|file| filter.admit(file.category()))
            .collect();
        let discarded = total - admitted.len();
        if discarded > 0 {
            tracing::debug!(discarded, "Dropped duplicate export files");
        }

        self.message = None;
        self.accepted = Some(admitted.clone());
        let count = admitted.len();
        handler.on_accept(admitted);
        DropOutcome::Accepted {
            admitted: count,
            discarded,
        }
    }

    /// Active message at `now`, if it has not expired.
    pub fn message(&self, now: Instant) -> Option<&'static str> {
        self.message
            .filter(|message| now.duration_since(message.raised_at) < MESSAGE_TIMEOUT)
            .map(|message| message.text)
    }

    /// Message to render at `now`: the active message or the placeholder.
    pub fn display_text(&self, now: Instant) -> &'static str {
        self.message(now).unwrap_or(PLACEHOLDER)
    }

    /// Forget an expired message. Returns whether one was cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        if self.message.is_some() && self.message(now).is_none() {
            self.message = None;
            return true;
        }
        false
    }

    /// Files admitted by the last successful gesture.
    pub fn accepted_files(&self) -> Option<&[SourceFile]> {
        self.accepted.as_deref()
    }

    /// Heading for the accepted-file list.
    pub fn accepted_header(&self) -> Option<&'static str> {
        match self.accepted.as_deref() {
            Some([_]) => Some("Import File"),
            Some([_, ..]) => Some("Import Files"),
            _ => None,
        }
    }
}
