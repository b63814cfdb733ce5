//! Export as a self-contained task that can run off the interactive thread.
//!
//! The request carries everything the export needs by value, so a worker
//! never touches the engine that queued it.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use gif_types::{CaptionSpec, ProcessingError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::export::{ExportOptions, ExportPipeline};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub gif: Vec<u8>,
    pub caption: CaptionSpec,
    #[serde(default)]
    pub options: ExportOptions,
}

impl ExportRequest {
    pub fn new(gif: Vec<u8>, caption: CaptionSpec) -> Self {
        Self {
            gif,
            caption,
            options: ExportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportResponse {
    Done { gif: Vec<u8> },
    Failed { error: ProcessingError },
}

impl ExportResponse {
    pub fn into_result(self) -> Result<Vec<u8>, ProcessingError> {
        match self {
            ExportResponse::Done { gif } => Ok(gif),
            ExportResponse::Failed { error } => Err(error),
        }
    }
}

impl From<Result<Vec<u8>, ProcessingError>> for ExportResponse {
    fn from(result: Result<Vec<u8>, ProcessingError>) -> Self {
        match result {
            Ok(gif) => ExportResponse::Done { gif },
            Err(error) => ExportResponse::Failed { error },
        }
    }
}

/// Run one export to completion on the calling thread.
pub fn run_export_task(request: ExportRequest) -> ExportResponse {
    let ExportRequest { gif, caption, options } = request;
    let result = ExportPipeline::new(options).run(&gif, &caption);
    if let Err(e) = &result {
        error!(stage = "export", code = e.code(), error = %e, "Export task failed");
    }
    result.into()
}

/// Handle to an export running on its own thread.
///
/// Dropping the handle abandons the result; the thread finishes and its
/// send fails silently.
#[derive(Debug)]
pub struct ExportWorker {
    rx: Receiver<ExportResponse>,
}

impl ExportWorker {
    pub fn spawn(request: ExportRequest) -> Self {
        let (tx, rx) = mpsc::channel();
        info!(stage = "export", bytes = request.gif.len(), "Spawning export worker");
        thread::spawn(move || {
            let response = run_export_task(request);
            if tx.send(response).is_err() {
                warn!(stage = "export", "Export result dropped, requester went away");
            }
        });
        Self { rx }
    }

    /// Block until the export finishes.
    pub fn wait(self) -> Result<Vec<u8>, ProcessingError> {
        match self.rx.recv() {
            Ok(response) => response.into_result(),
            Err(e) => Err(ProcessingError::WorkerDisconnected { message: e.to_string() }),
        }
    }

    /// `None` while the export is still running.
    pub fn try_result(&self) -> Option<Result<Vec<u8>, ProcessingError>> {
        match self.rx.try_recv() {
            Ok(response) => Some(response.into_result()),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ProcessingError::WorkerDisconnected {
                message: "worker exited without a result".to_string(),
            })),
        }
    }

    pub fn abandon(self) {
        info!(stage = "export", "Export worker abandoned");
    }
}
