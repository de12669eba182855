//! Audio metadata extraction and preprocessing.
//!
//! All codec work is delegated to an external transcoder binary (ffmpeg /
//! ffprobe); this crate owns only the invocation contract and the parsing of
//! probe output.

mod error;
pub mod preprocess;
pub mod probe;
pub mod transcode;

pub use error::AudioError;
pub use transcode::Transcoder;
