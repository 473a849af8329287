// Reverse log reading: filtering, backward line decoding, and output framing.

pub mod error;
pub mod filter;
pub mod frame;
pub mod reverse;

pub use error::ReaderError;
pub use filter::{FilterError, LineFilter};
pub use frame::{JsonLinesFramer, RawLineFramer};
pub use reverse::{LineReaderOptions, LineRecord, ReverseLineReader, DEFAULT_CHUNK_SIZE};
