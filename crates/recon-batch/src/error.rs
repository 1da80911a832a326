use recon_core::ReconError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("BATCH/POOL: {0}")]
    Pool(String),

    #[error("BATCH/PANIC: {0}")]
    Panicked(String),

    #[error("BATCH/ITEM: {0}")]
    Item(#[from] ReconError),
}

impl From<BatchError> for ReconError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Item(inner) => inner,
            BatchError::Pool(reason) => ReconError::Config(format!("worker pool: {reason}")),
            BatchError::Panicked(reason) => ReconError::StageExecution {
                step: "batch".to_string(),
                code: None,
                reason,
            },
        }
    }
}

pub type BatchResult<T> = Result<T, BatchError>;
