//! Reverse: backward, chunked line reading over a log file.
//!
//! Lines come out most-recent-physical-line-first. The reader is pull-based:
//! a chunk is read from the source only when every line decoded from the
//! previous chunk has been handed out.

pub mod cursor;
pub mod reader;
pub mod stream;

pub use cursor::ReadCursor;
pub use reader::{LineReaderOptions, LineRecord, ReverseLineReader, DEFAULT_CHUNK_SIZE};
