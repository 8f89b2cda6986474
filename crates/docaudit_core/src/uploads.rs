use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub type UploadId = u64;

/// Content type used when a stored filename has no recognised extension.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content types accepted by the upload control.
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("json", "application/json"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("zip", "application/zip"),
    ("exe", "application/x-msdownload"),
];

/// Infers a content type from the extension suffix of `name`.
pub fn content_type_for_name(name: &str) -> &'static str {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE;
    };
    if stem.is_empty() {
        return DEFAULT_CONTENT_TYPE;
    }
    EXTENSION_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, content_type)| *content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Allow-list check; parameters such as `; charset=utf-8` are ignored.
pub fn is_content_type_allowed<S: AsRef<str>>(content_type: &str, allowed: &[S]) -> bool {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    allowed
        .iter()
        .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(ct))
}

/// `round(sent / total * 100)`, clamped to 100. An empty body counts as complete.
pub fn progress_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let sent = sent.min(total) as u128;
    let pct = (sent * 200 + total as u128) / (total as u128 * 2);
    pct as u8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadSource {
    Local(PathBuf),
    /// Synthetic record for a file that was already stored before this session.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadPhase {
    Selected,
    GrantRequested,
    GrantReceived,
    Transferring,
    Stored,
    Failed,
}

impl UploadPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadPhase::Stored | UploadPhase::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            UploadPhase::Selected => 0,
            UploadPhase::GrantRequested => 1,
            UploadPhase::GrantReceived => 2,
            UploadPhase::Transferring => 3,
            UploadPhase::Stored | UploadPhase::Failed => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: UploadId,
    pub display_name: String,
    pub content_type: String,
    pub source: UploadSource,
    pub phase: UploadPhase,
    pub progress: u8,
    pub error: Option<String>,
}

/// A locally selected file, before the allow-list check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub name: String,
    pub content_type: String,
    pub path: PathBuf,
}

impl FileCandidate {
    /// Candidate whose content type is inferred from its file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = content_type_for_name(&name).to_string();
        Self {
            name,
            content_type,
            path,
        }
    }
}

/// Files rejected by the allow-list, surfaced as one aggregated message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("File type not allowed: {}", describe_rejected(.rejected))]
pub struct UnsupportedTypeError {
    pub rejected: Vec<FileCandidate>,
}

fn describe_rejected(rejected: &[FileCandidate]) -> String {
    rejected
        .iter()
        .map(|candidate| format!("{} ({})", candidate.content_type, candidate.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ordered, keyed collection of upload records.
///
/// Ids are handed out monotonically, so key order is insertion order and doubles
/// as display position. Every mutator consumes the previous value and returns the
/// next one, which is what `Store::update` expects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadSet {
    records: BTreeMap<UploadId, UploadRecord>,
    next_id: UploadId,
}

impl UploadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: UploadId) -> Option<&UploadRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &UploadRecord> {
        self.records.values()
    }

    pub fn at(&self, position: usize) -> Option<&UploadRecord> {
        self.records.values().nth(position)
    }

    /// Names of records that reached `Stored`, in display order.
    pub fn stored_names(&self) -> Vec<String> {
        self.records
            .values()
            .filter(|r| r.phase == UploadPhase::Stored)
            .map(|r| r.display_name.clone())
            .collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.phase.is_terminal())
            .count()
    }

    fn push(&mut self, display_name: String, content_type: String, source: UploadSource) -> UploadId {
        self.next_id += 1;
        let id = self.next_id;
        let (phase, progress) = match source {
            UploadSource::Remote => (UploadPhase::Stored, 100),
            UploadSource::Local(_) => (UploadPhase::Selected, 0),
        };
        self.records.insert(
            id,
            UploadRecord {
                id,
                display_name,
                content_type,
                source,
                phase,
                progress,
                error: None,
            },
        );
        id
    }

    /// Reconciles the remote placeholders with a fresh listing.
    ///
    /// Placeholders still listed keep their id and position; unlisted ones are
    /// dropped. Names that already have a live record are not duplicated.
    pub fn with_remote_listing(mut self, names: &[String]) -> Self {
        self.records.retain(|_, record| {
            record.source != UploadSource::Remote || names.contains(&record.display_name)
        });
        for name in names {
            let already_present = self.records.values().any(|r| {
                r.display_name == *name && r.phase != UploadPhase::Failed
            });
            if already_present {
                continue;
            }
            let content_type = content_type_for_name(name).to_string();
            self.push(name.clone(), content_type, UploadSource::Remote);
        }
        self
    }

    /// Appends the allowed candidates at progress 0.
    ///
    /// Returns the accepted files with their new ids, plus one aggregated
    /// rejection for everything that failed the allow-list.
    pub fn with_selected<S: AsRef<str>>(
        mut self,
        candidates: Vec<FileCandidate>,
        allowed: &[S],
    ) -> (Self, Vec<(UploadId, FileCandidate)>, Option<UnsupportedTypeError>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for candidate in candidates {
            if !is_content_type_allowed(&candidate.content_type, allowed) {
                rejected.push(candidate);
                continue;
            }
            let id = self.push(
                candidate.name.clone(),
                candidate.content_type.clone(),
                UploadSource::Local(candidate.path.clone()),
            );
            accepted.push((id, candidate));
        }
        let rejection = (!rejected.is_empty()).then_some(UnsupportedTypeError { rejected });
        (self, accepted, rejection)
    }

    /// Advances the phase; never regresses and never leaves a terminal phase.
    pub fn with_phase(mut self, id: UploadId, phase: UploadPhase) -> Self {
        if let Some(record) = self.records.get_mut(&id) {
            if !record.phase.is_terminal() && phase.rank() >= record.phase.rank() {
                record.phase = phase;
            }
        }
        self
    }

    /// Applies a progress report; lower values than the current one are dropped.
    pub fn with_progress(mut self, id: UploadId, progress: u8) -> Self {
        if let Some(record) = self.records.get_mut(&id) {
            if record.phase.is_terminal() {
                return self;
            }
            record.progress = record.progress.max(progress.min(100));
            record.phase = UploadPhase::Transferring;
        }
        self
    }

    pub fn with_stored(mut self, id: UploadId) -> Self {
        if let Some(record) = self.records.get_mut(&id) {
            if !record.phase.is_terminal() {
                record.phase = UploadPhase::Stored;
                record.progress = 100;
            }
        }
        self
    }

    pub fn with_failure(mut self, id: UploadId, message: impl Into<String>) -> Self {
        if let Some(record) = self.records.get_mut(&id) {
            if !record.phase.is_terminal() {
                record.phase = UploadPhase::Failed;
                record.error = Some(message.into());
            }
        }
        self
    }

    /// Removes the record at display `position`; relative order of the rest is kept.
    pub fn without_position(mut self, position: usize) -> (Self, Option<UploadRecord>) {
        let id = self.records.keys().nth(position).copied();
        let removed = id.and_then(|id| self.records.remove(&id));
        (self, removed)
    }
}
