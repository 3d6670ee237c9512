//! Dispatch Module
//!
//! Turns one OCR request into ordered per-image results:
//! validation, worker load, per-request workspace, inference and
//! result assembly.

mod dispatcher;
mod output;
mod types;
mod worker;
mod workspace;

pub use dispatcher::Dispatcher;
pub use output::assemble_results;
pub use types::{Level, OcrRequest, OcrResult};
pub use worker::{
    read_output, ScriptWorkerClient, WorkerClient, WorkerJob, WorkerOutput, META_FILE,
    OUTPUT_FILE, PARAMS_FILE,
};
pub use workspace::RequestWorkspace;
