use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncSeek};
use tokio_stream::Stream;

use super::reader::{LineRecord, ReverseLineReader};
use crate::error::ReaderError;
use crate::frame::Framer;

impl<R> ReverseLineReader<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
{
    /// Turn the reader into a stream of lines.
    ///
    /// The stream yields at most one error and then ends. Dropping it drops
    /// the reader, which releases the file handle.
    pub fn into_stream(self) -> impl Stream<Item = Result<LineRecord, ReaderError>> + Send + 'static {
        async_stream::stream! {
            let mut reader = self;
            loop {
                match reader.next_line().await {
                    Ok(Some(record)) => yield Ok(record),
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        }
    }

    /// Like [`into_stream`](Self::into_stream), with every line passed through `framer`.
    pub fn into_framed<F>(self, framer: F) -> impl Stream<Item = Result<Bytes, ReaderError>> + Send + 'static
    where
        F: Framer + Send + 'static,
    {
        async_stream::stream! {
            let mut reader = self;
            loop {
                match reader.next_line().await {
                    Ok(Some(record)) => yield Ok(framer.frame(&record.content)),
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        }
    }
}
