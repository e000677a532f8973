//! Piezas compartidas del pipeline: partir un CSV grande en chunks, subirlos
//! al store y despachar una tarea remota por chunk.

pub mod chunk;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod process;
pub mod split;
pub mod store;
pub mod synthetic;
pub mod task;
pub mod upload;
pub mod worker;

pub use chunk::{ChunkWriter, Header, LocalChunk, Row};
pub use config::{MismatchPolicy, PipelineConfig, StorageConfig};
pub use contract::{chunk_index_of, chunk_key, processed_key, task_index_of};
pub use dispatch::{plan_tasks, DispatchedJob, ExecutionService, TaskDispatcher, TaskSpec};
pub use error::{PipelineError, Result};
pub use job::{JobHandle, JobId, JobInfo, JobSpec, JobStatus};
pub use process::{ChunkProcessor, ProcessedChunk, TaskEnvironment};
pub use split::{SplitOutcome, Splitter};
pub use store::{build_store, ChunkStore, ObjectChunkStore};
pub use task::{Task, TaskId};
pub use upload::{ChunkUpload, ChunkUploader, UploadReport};
pub use worker::{
    TaskAssignmentRequest, TaskAssignmentResponse, TaskCompleteRequest, TaskCompleteResponse,
    WorkerHeartbeatRequest, WorkerHeartbeatResponse, WorkerId, WorkerRegisterRequest,
    WorkerRegisterResponse,
};
