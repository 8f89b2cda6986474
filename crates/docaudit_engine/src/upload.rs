use std::sync::Arc;

use client_logging::{client_debug, client_info, client_warn};
use docaudit_core::{
    progress_percent, FileCandidate, Store, UnsupportedTypeError, UploadId, UploadPhase,
    UploadRecord, UploadSet, UploadSource,
};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;

use crate::api::BackendApi;
use crate::{ApiError, ErrorKind};

/// Files accepted by one selection, each transferring on its own task.
pub struct UploadBatch {
    pub rejection: Option<UnsupportedTypeError>,
    transfers: Vec<(UploadId, JoinHandle<Result<(), ApiError>>)>,
}

impl UploadBatch {
    pub fn accepted(&self) -> Vec<UploadId> {
        self.transfers.iter().map(|(id, _)| *id).collect()
    }

    /// Waits for every transfer in the batch, in selection order.
    pub async fn finished(self) -> Vec<(UploadId, Result<(), ApiError>)> {
        let mut results = Vec::with_capacity(self.transfers.len());
        for (id, handle) in self.transfers {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(ApiError::new(ErrorKind::PartialUpload, err.to_string())),
            };
            results.push((id, result));
        }
        results
    }
}

/// Moves selected files into storage and keeps the shared file list current.
pub struct UploadPipeline {
    api: Arc<BackendApi>,
    files: Store<UploadSet>,
}

impl UploadPipeline {
    pub fn new(api: Arc<BackendApi>, files: Store<UploadSet>) -> Self {
        Self { api, files }
    }

    pub fn files(&self) -> &Store<UploadSet> {
        &self.files
    }

    /// Fetches the stored names for `subject` and merges them into the set.
    pub async fn list_remote_files(&self, subject: &str) -> Result<Vec<String>, ApiError> {
        let names = self.api.list_files(subject).await?;
        client_debug!("backend lists {} stored files", names.len());
        self.files.update(|set| set.with_remote_listing(&names));
        Ok(names)
    }

    /// Validates the selection against the allow-list and starts one transfer
    /// per accepted file. Rejected files never reach the network.
    pub fn select_files(&self, subject: &str, candidates: Vec<FileCandidate>) -> UploadBatch {
        let allowed = self.api.settings().allowed_content_types.as_slice();
        let mut accepted = Vec::new();
        let mut rejection = None;
        self.files.update(|set| {
            let (next, added, rejected) = set.with_selected(candidates, allowed);
            accepted = added;
            rejection = rejected;
            next
        });
        if let Some(rejected) = &rejection {
            client_warn!("{}", rejected);
        }

        let chunk_size = self.api.settings().transfer_chunk_size;
        let transfers = accepted
            .into_iter()
            .map(|(id, candidate)| {
                let api = Arc::clone(&self.api);
                let files = self.files.clone();
                let subject = subject.to_string();
                let handle = tokio::spawn(async move {
                    transfer(api, files, id, subject, candidate, chunk_size).await
                });
                (id, handle)
            })
            .collect();
        UploadBatch {
            rejection,
            transfers,
        }
    }

    /// Removes the file at `position` right away, then asks the backend to
    /// delete it. A failed request is reported but the entry stays removed.
    pub async fn delete_file(
        &self,
        subject: &str,
        position: usize,
    ) -> Result<Option<UploadRecord>, ApiError> {
        let mut removed = None;
        self.files.update(|set| {
            let (next, record) = set.without_position(position);
            removed = record;
            next
        });
        let Some(record) = removed else {
            client_debug!("no file at position {}", position);
            return Ok(None);
        };
        let deletable = matches!(record.source, UploadSource::Remote)
            || record.phase == UploadPhase::Stored;
        if deletable {
            if let Err(err) = self.api.delete_file(subject, &record.display_name).await {
                client_warn!("delete of {} failed: {}", record.display_name, err);
                return Err(err);
            }
            client_info!("deleted {}", record.display_name);
        }
        Ok(Some(record))
    }
}

async fn transfer(
    api: Arc<BackendApi>,
    files: Store<UploadSet>,
    id: UploadId,
    subject: String,
    candidate: FileCandidate,
    chunk_size: usize,
) -> Result<(), ApiError> {
    let result = run_transfer(&api, &files, id, &subject, &candidate, chunk_size).await;
    match &result {
        Ok(()) => {
            client_info!("stored {}", candidate.name);
            files.update(|set| set.with_stored(id));
        }
        Err(err) => {
            client_warn!("upload of {} failed: {}", candidate.name, err);
            let message = err.to_string();
            files.update(|set| set.with_failure(id, message));
        }
    }
    result
}

async fn run_transfer(
    api: &BackendApi,
    files: &Store<UploadSet>,
    id: UploadId,
    subject: &str,
    candidate: &FileCandidate,
    chunk_size: usize,
) -> Result<(), ApiError> {
    files.update(|set| set.with_phase(id, UploadPhase::GrantRequested));
    let grant = api
        .request_grant(subject, &candidate.name, &candidate.content_type)
        .await?;
    files.update(|set| set.with_phase(id, UploadPhase::GrantReceived));

    let local_error = |err: std::io::Error| {
        ApiError::new(
            ErrorKind::PartialUpload,
            format!("cannot read {:?}: {err}", candidate.path),
        )
    };
    let file = tokio::fs::File::open(&candidate.path)
        .await
        .map_err(local_error)?;
    let total = file.metadata().await.map_err(local_error)?.len();

    let mut sent = 0u64;
    let progress_files = files.clone();
    let body = ReaderStream::with_capacity(file, chunk_size.max(1)).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            sent += bytes.len() as u64;
            let percent = progress_percent(sent, total);
            progress_files.update(|set| set.with_progress(id, percent));
        }
        chunk
    });
    files.update(|set| set.with_progress(id, 0));
    api.put_object(
        &grant.presigned_url,
        &candidate.content_type,
        total,
        reqwest::Body::wrap_stream(body),
    )
    .await
    .map_err(|err| err.with_kind(ErrorKind::PartialUpload))
}
