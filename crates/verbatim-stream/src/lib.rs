//! Live-streaming ingest: the per-connection session state machine, the
//! chunk processor with its incremental master-transcript merge, the session
//! finalizer, and the in-memory quick-job store.

mod error;
pub mod chunks;
pub mod finalize;
pub mod quickjobs;
pub mod session;

pub use chunks::{ChunkProcessor, ChunkSubmission};
pub use error::StreamError;
pub use finalize::SessionFinalizer;
pub use quickjobs::{QuickJob, QuickJobStore};
pub use session::{SessionState, StreamSession, LIVE_CONTAINER_EXT};
