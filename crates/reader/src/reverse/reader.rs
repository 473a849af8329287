use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, trace};

use super::cursor::ReadCursor;
use crate::error::ReaderError;
use crate::filter::LineFilter;

/// Bytes read from disk per pull.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

const NEW_LINE: u8 = b'\n';

/// Per-request read options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineReaderOptions {
    /// Maximum number of matching lines to emit; 0 = unlimited.
    pub line_limit: u64,
    /// Optional filter pattern; only matching lines are emitted and counted.
    pub pattern: Option<String>,
}

/// One emitted line (delimiter excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub content: Bytes,
    /// 1-based emission order.
    pub sequence: u64,
}

/// Reads a file from its end toward its start, one chunk per pull,
/// reconstructing lines that straddle chunk boundaries.
///
/// The reader owns its source exclusively and releases it exactly once: when
/// the start of the file is reached, when the line cap is hit, when a read
/// fails, or when the reader is dropped.
pub struct ReverseLineReader<R = File> {
    source: Option<R>,
    cursor: ReadCursor,
    file_size: u64,
    chunk_size: usize,
    line_limit: u64,
    filter: LineFilter,
    /// Lines accepted by the filter so far (counted against `line_limit`).
    accepted: u64,
    /// Lines handed to the consumer so far.
    delivered: u64,
    /// Lines decoded from the current chunk, most recent first.
    pending: VecDeque<Bytes>,
    /// The file's final `\n` terminates the last line; it is dropped once.
    tail_trimmed: bool,
    finished: bool,
}

impl ReverseLineReader<File> {
    /// Open `path` for a reverse read.
    ///
    /// The pattern is compiled before the file is touched, so an invalid
    /// pattern is reported even for a missing file. A missing path, or one
    /// that is not a regular file, is [`ReaderError::NotFound`].
    pub async fn open(path: impl AsRef<Path>, options: LineReaderOptions) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        let filter = LineFilter::new(options.pattern.as_deref())?;

        let file = File::open(path)
            .await
            .map_err(|e| ReaderError::from_open(path, e))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(ReaderError::NotFound(path.to_path_buf()));
        }

        debug!(
            path = %path.display(),
            size = metadata.len(),
            line_limit = options.line_limit,
            filtered = filter.is_active(),
            "Opened log file for reverse read"
        );

        Ok(Self::with_filter(file, metadata.len(), options.line_limit, filter))
    }
}

impl<R> ReverseLineReader<R>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    /// Build a reader over an already-open source of `len` bytes.
    pub fn from_source(source: R, len: u64, options: LineReaderOptions) -> Result<Self, ReaderError> {
        let filter = LineFilter::new(options.pattern.as_deref())?;
        Ok(Self::with_filter(source, len, options.line_limit, filter))
    }

    fn with_filter(source: R, len: u64, line_limit: u64, filter: LineFilter) -> Self {
        Self {
            source: Some(source),
            cursor: ReadCursor::new(len),
            file_size: len,
            chunk_size: DEFAULT_CHUNK_SIZE,
            line_limit,
            filter,
            accepted: 0,
            delivered: 0,
            pending: VecDeque::new(),
            tail_trimmed: false,
            finished: false,
        }
    }

    /// Override the read chunk size (minimum 1 byte). Output does not depend on it.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Produce the next line, most recent first, or `None` at end of stream.
    ///
    /// After an error the source is released and every later call returns `Ok(None)`.
    pub async fn next_line(&mut self) -> Result<Option<LineRecord>, ReaderError> {
        loop {
            if let Some(content) = self.pending.pop_front() {
                self.delivered += 1;
                return Ok(Some(LineRecord {
                    content,
                    sequence: self.delivered,
                }));
            }

            if self.finished {
                self.release();
                return Ok(None);
            }

            if self.cursor.at_start() {
                // Everything left is the first physical line, which no delimiter precedes.
                let first = self.cursor.take_remainder();
                if !first.is_empty() {
                    self.accept(first);
                }
                self.finish();
                continue;
            }

            if let Err(err) = self.fill().await {
                self.finish();
                return Err(err);
            }
        }
    }

    /// Read the chunk ending at the cursor and decode every complete line in it.
    async fn fill(&mut self) -> Result<(), ReaderError> {
        let (start, len) = self.cursor.next_window(self.chunk_size);
        let Some(source) = self.source.as_mut() else {
            self.finished = true;
            return Ok(());
        };

        let mut buf = vec![0u8; len];
        source.seek(SeekFrom::Start(start)).await?;
        source.read_exact(&mut buf).await?;
        self.cursor.retreat_to(start);
        trace!(start, len, carried = self.cursor.remainder_len(), "Read chunk");

        if !self.tail_trimmed {
            self.tail_trimmed = true;
            if buf.last() == Some(&NEW_LINE) {
                buf.pop();
            }
        }

        let buf = Bytes::from(buf);
        let Some(last) = memchr::memrchr(NEW_LINE, &buf) else {
            // Still inside one line; keep the chunk as is.
            self.cursor.carry(buf);
            return Ok(());
        };

        // The bytes after the last delimiter start the line carried from later chunks.
        let line = self.cursor.take_line(buf.slice(last + 1..));
        if self.accept(line) {
            return Ok(());
        }

        let mut end = last;
        while let Some(delim) = memchr::memrchr(NEW_LINE, &buf[..end]) {
            let line = buf.slice(delim + 1..end);
            end = delim;
            if self.accept(line) {
                // Cap reached; earlier bytes in this chunk are never needed.
                return Ok(());
            }
        }

        self.cursor.carry(buf.slice(..end));
        Ok(())
    }

    /// Queue `line` if it passes the filter. Returns true once the cap is reached.
    fn accept(&mut self, line: Bytes) -> bool {
        if !self.filter.matches(&line) {
            return false;
        }
        self.accepted += 1;
        self.pending.push_back(line);

        if self.line_limit > 0 && self.accepted >= self.line_limit {
            self.finish();
            return true;
        }
        false
    }

    fn finish(&mut self) {
        self.finished = true;
        self.cursor.clear_remainder();
        self.release();
    }

    fn release(&mut self) {
        if self.source.take().is_some() {
            let (scanned, matched, bytes) = self.filter.stats();
            debug!(
                lines_scanned = scanned,
                lines_matched = matched,
                bytes_scanned = bytes,
                lines_delivered = self.delivered,
                "Released log file handle"
            );
        }
    }
}

impl<R> ReverseLineReader<R> {
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Lines handed to the consumer so far.
    pub fn lines_emitted(&self) -> u64 {
        self.delivered
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// (lines scanned, lines matched, bytes processed)
    pub fn filter_stats(&self) -> (u64, u64, u64) {
        self.filter.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    const CHUNK_SIZES: &[usize] = &[1, 2, 3, 5, 7, 13, 64, 100, 1024, 4096];

    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
    }

    fn options(line_limit: u64, pattern: Option<&str>) -> LineReaderOptions {
        LineReaderOptions {
            line_limit,
            pattern: pattern.map(str::to_string),
        }
    }

    async fn drain<R>(reader: &mut ReverseLineReader<R>) -> Vec<String>
    where
        R: AsyncRead + AsyncSeek + Unpin,
    {
        let mut lines = Vec::new();
        while let Some(record) = reader.next_line().await.unwrap() {
            lines.push(String::from_utf8(record.content.to_vec()).unwrap());
        }
        lines
    }

    async fn read_bytes(data: &[u8], opts: LineReaderOptions, chunk_size: usize) -> Vec<String> {
        let mut reader = ReverseLineReader::from_source(Cursor::new(data.to_vec()), data.len() as u64, opts)
            .unwrap()
            .with_chunk_size(chunk_size);
        let lines = drain(&mut reader).await;
        assert!(reader.is_closed());
        lines
    }

    fn fixture_lines() -> Vec<String> {
        std::fs::read_to_string(fixture("caddy.log"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Source wrapper counting how many times it was dropped.
    struct Tracked<R> {
        inner: R,
        drops: Arc<AtomicUsize>,
    }

    impl<R> Drop for Tracked<R> {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl<R: AsyncRead + Unpin> AsyncRead for Tracked<R> {
        fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl<R: AsyncSeek + Unpin> AsyncSeek for Tracked<R> {
        fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
            Pin::new(&mut self.inner).start_seek(position)
        }

        fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
            Pin::new(&mut self.inner).poll_complete(cx)
        }
    }

    fn tracked(data: &[u8], claimed_len: u64, opts: LineReaderOptions) -> (ReverseLineReader<Tracked<Cursor<Vec<u8>>>>, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let source = Tracked {
            inner: Cursor::new(data.to_vec()),
            drops: drops.clone(),
        };
        let reader = ReverseLineReader::from_source(source, claimed_len, opts)
            .unwrap()
            .with_chunk_size(8);
        (reader, drops)
    }

    #[tokio::test]
    async fn test_fixture_unlimited_returns_all_lines_last_first() {
        let mut reader = ReverseLineReader::open(fixture("caddy.log"), options(0, None)).await.unwrap();
        let lines = drain(&mut reader).await;

        let mut expected = fixture_lines();
        expected.reverse();
        assert_eq!(lines.len(), 14);
        assert_eq!(lines, expected);
        assert_eq!(reader.lines_emitted(), 14);
        assert!(reader.is_closed());
    }

    #[tokio::test]
    async fn test_fixture_line_count_returns_most_recent() {
        let mut reader = ReverseLineReader::open(fixture("caddy.log"), options(10, None)).await.unwrap();
        let lines = drain(&mut reader).await;

        let expected: Vec<String> = fixture_lines().into_iter().rev().take(10).collect();
        assert_eq!(lines, expected);
    }

    #[tokio::test]
    async fn test_line_count_above_total_never_pads() {
        let mut reader = ReverseLineReader::open(fixture("caddy.log"), options(100, None)).await.unwrap();
        assert_eq!(drain(&mut reader).await.len(), 14);
    }

    #[tokio::test]
    async fn test_fixture_pattern_selects_matching_lines() {
        let mut reader = ReverseLineReader::open(fixture("caddy.log"), options(0, Some("Caddyfile")))
            .await
            .unwrap();
        let lines = drain(&mut reader).await;

        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.contains("Caddyfile")));
        assert!(lines[0].contains("not formatted"));
        assert!(lines[1].contains("using adjacent Caddyfile"));
    }

    #[tokio::test]
    async fn test_pattern_counts_against_cap() {
        let mut reader = ReverseLineReader::open(fixture("caddy.log"), options(1, Some("Caddyfile")))
            .await
            .unwrap();
        let lines = drain(&mut reader).await;

        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("not formatted"));
    }

    #[tokio::test]
    async fn test_empty_fixture_yields_nothing() {
        let mut reader = ReverseLineReader::open(fixture("empty.log"), options(0, None)).await.unwrap();
        assert_eq!(reader.file_size(), 0);
        assert!(reader.next_line().await.unwrap().is_none());
        assert!(reader.is_closed());
    }

    #[tokio::test]
    async fn test_sequence_numbers_are_one_based() {
        let mut reader = ReverseLineReader::from_source(Cursor::new(b"a\nb\nc\n".to_vec()), 6, options(0, None)).unwrap();
        let mut sequences = Vec::new();
        while let Some(record) = reader.next_line().await.unwrap() {
            sequences.push(record.sequence);
        }
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_output_is_independent_of_chunk_size() {
        let caddy = std::fs::read(fixture("caddy.log")).unwrap();
        let samples: Vec<&[u8]> = vec![
            caddy.as_slice(),
            &b"one\ntwo\nthree\n"[..],
            &b"one\ntwo\nthree"[..],
            &b"a\n\nb\n\n\nc\n"[..],
            &b"\nleading\n"[..],
            &b"\n"[..],
            &b"\n\n"[..],
            &b"single line no newline"[..],
            &b"crlf\r\nlines\r\n"[..],
            &b""[..],
        ];

        for sample in samples {
            for opts in [options(0, None), options(2, None), options(0, Some("e"))] {
                let baseline = read_bytes(sample, opts.clone(), 1 << 20).await;
                for &chunk in CHUNK_SIZES {
                    let lines = read_bytes(sample, opts.clone(), chunk).await;
                    assert_eq!(
                        lines, baseline,
                        "chunk size {} changed output for {:?}",
                        chunk,
                        String::from_utf8_lossy(sample)
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_line_edge_cases() {
        assert_eq!(read_bytes(b"one\ntwo\nthree\n", options(0, None), 4).await, vec!["three", "two", "one"]);
        assert_eq!(read_bytes(b"one\ntwo\nthree", options(0, None), 4).await, vec!["three", "two", "one"]);
        assert_eq!(read_bytes(b"a\n\nb\n", options(0, None), 2).await, vec!["b", "", "a"]);
        assert_eq!(read_bytes(b"\nleading\n", options(0, None), 3).await, vec!["leading"]);
        assert_eq!(read_bytes(b"\n", options(0, None), 3).await, Vec::<String>::new());
        assert_eq!(read_bytes(b"crlf\r\n", options(0, None), 3).await, vec!["crlf\r"]);
    }

    #[tokio::test]
    async fn test_chunk_boundary_on_delimiter_adds_no_empty_line() {
        // The second chunk ends exactly on the "\n" that terminates "abc".
        let lines = read_bytes(b"abc\ndefg\n", options(0, None), 5).await;
        assert_eq!(lines, vec!["defg", "abc"]);
        let lines = read_bytes(b"abc\ndefg", options(0, None), 4).await;
        assert_eq!(lines, vec!["defg", "abc"]);
    }

    #[tokio::test]
    async fn test_first_line_respects_filter() {
        let lines = read_bytes(b"skip me\nkeep me\n", options(0, Some("keep")), 4).await;
        assert_eq!(lines, vec!["keep me"]);
    }

    #[tokio::test]
    async fn test_filter_matching_nothing_consumes_file() {
        let (mut reader, drops) = tracked(b"alpha\nbeta\ngamma\n", 17, options(5, Some("delta")));
        assert!(reader.next_line().await.unwrap().is_none());
        assert!(reader.is_closed());
        let (scanned, matched, _) = reader.filter_stats();
        assert_eq!((scanned, matched), (3, 0));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReverseLineReader::open(dir.path().join("nope.log"), options(0, None))
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReverseLineReader::open(dir.path(), options(0, None)).await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_pattern_checked_before_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReverseLineReader::open(dir.path().join("nope.log"), options(0, Some("[oops")))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ReaderError::InvalidPattern(_)));
    }

    #[tokio::test]
    async fn test_handle_released_on_completion() {
        let (mut reader, drops) = tracked(b"a\nb\nc\n", 6, options(0, None));
        assert_eq!(drain(&mut reader).await, vec!["c", "b", "a"]);
        assert!(reader.is_closed());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(reader);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_released_when_cap_reached() {
        let (mut reader, drops) = tracked(b"a\nb\nc\nd\ne\n", 10, options(2, None));
        let first = reader.next_line().await.unwrap().unwrap();
        assert_eq!(&first.content[..], b"e");
        // The cap was hit while decoding the chunk, before the second line is handed out.
        assert!(reader.is_closed());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        let second = reader.next_line().await.unwrap().unwrap();
        assert_eq!(&second.content[..], b"d");
        assert!(reader.next_line().await.unwrap().is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_released_on_io_error() {
        // The source claims more bytes than it holds, so the positioned read fails.
        let (mut reader, drops) = tracked(b"short\n", 64, options(0, None));
        let err = reader.next_line().await.unwrap_err();
        assert!(matches!(err, ReaderError::Io(_)));
        assert!(reader.is_closed());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        assert!(reader.next_line().await.unwrap().is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_released_on_cancellation() {
        let data = b"one\ntwo\nthree\nfour\nfive\n";
        let (mut reader, drops) = tracked(data, data.len() as u64, options(0, None));
        assert!(reader.next_line().await.unwrap().is_some());
        assert!(!reader.is_closed());
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(reader);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_long_line_is_copied_once() {
        let mut data = vec![b'x'; 8 * 1024 * 1024];
        data.extend_from_slice(b"\nshort\n");
        let len = data.len() as u64;
        let mut reader = ReverseLineReader::from_source(Cursor::new(data), len, options(0, None)).unwrap();

        let started = std::time::Instant::now();
        let short = reader.next_line().await.unwrap().unwrap();
        let long = reader.next_line().await.unwrap().unwrap();
        let elapsed = started.elapsed();

        assert_eq!(&short.content[..], b"short");
        assert_eq!(long.content.len(), 8 * 1024 * 1024);
        assert!(long.content.iter().all(|&b| b == b'x'));
        assert!(reader.next_line().await.unwrap().is_none());
        // Re-copying the carried bytes on every 1 KiB pull takes minutes at this size.
        assert!(elapsed < std::time::Duration::from_secs(10), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_long_line_across_chunks_with_neighbours() {
        let long = "y".repeat(5000);
        let data = format!("first\n{}\nlast\n", long);
        for chunk in [1, 7, 1024] {
            let lines = read_bytes(data.as_bytes(), options(0, None), chunk).await;
            assert_eq!(lines, vec!["last".to_string(), long.clone(), "first".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_reads_lazily() {
        let data = b"0123456\n0123456\n0123456\n0123456\n";
        let (mut reader, _drops) = tracked(data, data.len() as u64, options(0, None));
        reader.next_line().await.unwrap();
        // The first chunk holds only the last line, so exactly two chunks were read.
        assert_eq!(reader.cursor.position, data.len() as u64 - 16);
        assert_eq!(reader.pending.len(), 0);
    }
}
