use thiserror::Error;

/// Result type for pipeline executor operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by the executor layer.
///
/// The pipeline engine itself is infallible: values are plain `T`, sending on
/// a finished pipeline is a silent no-op, and internal invariant violations
/// abort. Errors only arise from managing the thread pool.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The scheduler was already shut down
    #[error("scheduler has already been shut down")]
    SchedulerShutdown,

    /// A worker thread panicked while running a step
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
}
