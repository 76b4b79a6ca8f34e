//! Line-terminated text over a [`Connection`].
//!
//! Input is split on LF; a CR immediately before the LF is dropped, so LF and CRLF peers are
//! both understood. There is no maximum line length: the receive buffer size is only a hint
//! for how much is fetched per receive, and a longer line accumulates across refills.
//!
//! Output is written verbatim and followed by the configured [`Terminator`], which is sent
//! as a second transmission.

use netcall_types::prelude::*;
use netcall_wire::connection::{Connection, ReadMode};
use netcall_wire::tcp::TcpEndpoint;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_INPUT_SIZE: usize = 2048;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terminator {
    /// `put_line` appends nothing
    #[default]
    None,
    Lf,
    CrLf,
}

impl Terminator {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Terminator::None => b"",
            Terminator::Lf => b"\n",
            Terminator::CrLf => b"\r\n",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineOptions {
    pub terminator: Terminator,
    /// Receive buffer size
    pub input_size: usize,
    /// Kernel send buffer size requested when the stream is created
    pub output_size: Option<usize>,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            terminator: Terminator::None,
            input_size: DEFAULT_INPUT_SIZE,
            output_size: None,
        }
    }
}

impl LineOptions {
    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn with_input_size(mut self, input_size: usize) -> Self {
        self.input_size = input_size.max(1);
        self
    }

    pub fn with_output_size(mut self, output_size: usize) -> Self {
        self.output_size = Some(output_size.max(1));
        self
    }
}

/// Parses `-crlf`, `-lf`, `-input <size>` and `-output <size>`, e.g. `"-crlf -input 4096"`
impl FromStr for LineOptions {
    type Err = NetError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut options = LineOptions::default();
        let mut tokens = text.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "-crlf" => options.terminator = Terminator::CrLf,
                "-lf" => options.terminator = Terminator::Lf,
                "-input" => options.input_size = parse_size(token, tokens.next())?,
                "-output" => options.output_size = Some(parse_size(token, tokens.next())?),
                other => return Err(NetError::InvalidOption(other.to_string())),
            }
        }

        Ok(options)
    }
}

fn parse_size(option: &str, value: Option<&str>) -> NetResult<usize> {
    value
        .and_then(|size| size.parse::<usize>().ok())
        .filter(|size| *size > 0)
        .ok_or_else(|| NetError::InvalidOption(option.to_string()))
}

/// A line-oriented stream. Owns its connection and closes it when dropped
pub struct LineStream<C: Connection = TcpEndpoint> {
    conn: C,
    input: Box<[u8]>,
    next: usize,
    end: usize,
    line: Vec<u8>,
    options: LineOptions,
}

impl<C: Connection> LineStream<C> {
    pub fn new(conn: C, options: LineOptions) -> Self {
        log::debug!(target: "netcall", "[Line] ({}) created with {:?}", conn.name(), options);
        if let Some(size) = options.output_size {
            if let Err(err) = conn.set_send_buffer_size(size) {
                log::warn!(target: "netcall", "[Line] ({}) unable to size send buffer to {size}: {err}", conn.name());
            }
        }

        Self {
            conn,
            input: vec![0u8; options.input_size.max(1)].into_boxed_slice(),
            next: 0,
            end: 0,
            line: Vec::new(),
            options,
        }
    }

    pub fn options(&self) -> &LineOptions {
        &self.options
    }

    pub fn get_ref(&self) -> &C {
        &self.conn
    }

    pub fn name(&self) -> &str {
        self.conn.name()
    }

    /// Received bytes not yet returned to the caller
    pub fn pending_input(&self) -> usize {
        self.end - self.next
    }

    /// Reads the next line, without its terminator. The whole call is bounded by `timeout`.
    /// If it expires part-way through a line, the partial line is kept and the next call
    /// carries on from there
    pub fn get_line(&mut self, timeout: Timeout) -> NetResult<String> {
        let deadline = timeout.deadline();
        loop {
            if self.next < self.end {
                let window = &self.input[self.next..self.end];
                if let Some(pos) = window.iter().position(|b| *b == b'\n') {
                    self.line.extend_from_slice(&window[..pos]);
                    self.next += pos + 1;
                    if self.line.last() == Some(&b'\r') {
                        self.line.pop();
                    }

                    let line = String::from_utf8_lossy(&self.line).into_owned();
                    self.line.clear();
                    log::trace!(target: "netcall", "[Line] ({}) input: {line:?}", self.conn.name());
                    return Ok(line);
                }

                self.line.extend_from_slice(window);
                self.next = self.end;
            }

            let received = self
                .conn
                .read(deadline.remaining_timeout(), ReadMode::FirstChunk, &mut self.input)?;
            self.next = 0;
            self.end = received;
        }
    }

    /// Writes `text` followed by the terminator. Returns the total bytes sent
    pub fn put_line(&mut self, timeout: Timeout, text: &str) -> NetResult<usize> {
        let deadline = timeout.deadline();
        let mut sent = self.conn.write(timeout, text.as_bytes())?;

        let terminator = self.options.terminator.as_bytes();
        if !terminator.is_empty() {
            match self.conn.write(deadline.remaining_timeout(), terminator) {
                Ok(n) => sent += n,
                Err(NetError::WouldBlock { transferred }) => {
                    return Err(NetError::would_block(sent + transferred))
                }
                Err(err) => return Err(err),
            }
        }

        log::trace!(target: "netcall", "[Line] ({}) output: {text:?}", self.conn.name());
        Ok(sent)
    }

    /// Reads raw bytes, serving buffered input first
    pub fn read(&mut self, timeout: Timeout, mode: ReadMode, buf: &mut [u8]) -> NetResult<usize> {
        let buffered = self.pending_input().min(buf.len());
        buf[..buffered].copy_from_slice(&self.input[self.next..self.next + buffered]);
        self.next += buffered;

        if buffered == buf.len() || (buffered > 0 && mode == ReadMode::FirstChunk) {
            return Ok(buffered);
        }

        match self.conn.read(timeout, mode, &mut buf[buffered..]) {
            Ok(n) => Ok(buffered + n),
            Err(NetError::WouldBlock { transferred }) => {
                Err(NetError::would_block(buffered + transferred))
            }
            Err(err) => Err(err),
        }
    }

    pub fn write(&mut self, timeout: Timeout, buf: &[u8]) -> NetResult<usize> {
        self.conn.write(timeout, buf)
    }

    /// True if received bytes are waiting in the buffer or on the connection. A partial line
    /// kept after a timed-out `get_line` does not count
    pub fn is_readable(&self) -> bool {
        self.next < self.end || self.conn.is_readable()
    }

    pub fn is_up(&self) -> bool {
        self.conn.is_up()
    }

    pub fn is_writeable(&self) -> bool {
        self.conn.is_writeable()
    }

    pub fn close(&mut self) {
        self.conn.close()
    }
}

impl<C: Connection> Drop for LineStream<C> {
    fn drop(&mut self) {
        self.conn.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedConnection, Step};
    use netcall_wire::prelude::*;
    use rstest::rstest;

    fn stream(steps: Vec<Step>) -> LineStream<ScriptedConnection> {
        LineStream::new(ScriptedConnection::new(steps), LineOptions::default())
    }

    #[test]
    fn crlf_split_across_deliveries() {
        let mut lines = stream(vec![Step::data(b"AB"), Step::data(b"\r"), Step::data(b"\n")]);
        assert_eq!(lines.get_line(Timeout::from(1.0)).unwrap(), "AB");
        assert!(!lines.is_readable());
    }

    #[rstest]
    #[case(&[1])]
    #[case(&[2, 3])]
    #[case(&[7])]
    #[case(&[64])]
    fn any_chunking_yields_the_same_lines(#[case] sizes: &[usize]) {
        let input = b"first\r\nsecond\nthird line is longer than the buffer\r\n\n";
        let conn = ScriptedConnection::chunked(input, sizes);
        let mut lines = LineStream::new(conn, LineOptions::default().with_input_size(8));

        assert_eq!(lines.get_line(Timeout::Forever).unwrap(), "first");
        assert_eq!(lines.get_line(Timeout::Forever).unwrap(), "second");
        assert_eq!(
            lines.get_line(Timeout::Forever).unwrap(),
            "third line is longer than the buffer"
        );
        assert_eq!(lines.get_line(Timeout::Forever).unwrap(), "");
        assert!(matches!(
            lines.get_line(Timeout::Forever),
            Err(NetError::ConnectionClosed)
        ));
    }

    #[test]
    fn buffered_lines_need_no_receive() {
        let mut lines = stream(vec![Step::data(b"one\ntwo\n")]);
        assert_eq!(lines.get_line(Timeout::IMMEDIATE).unwrap(), "one");
        assert!(lines.is_readable());
        assert_eq!(lines.get_line(Timeout::IMMEDIATE).unwrap(), "two");
        assert_eq!(lines.get_ref().reads(), 1);
    }

    #[test]
    fn timeout_keeps_the_partial_line() {
        let mut lines = stream(vec![Step::data(b"par"), Step::Stall, Step::data(b"tial\n")]);
        let err = lines.get_line(Timeout::IMMEDIATE).unwrap_err();
        assert!(err.is_would_block());
        assert_eq!(lines.get_line(Timeout::IMMEDIATE).unwrap(), "partial");
    }

    #[rstest]
    #[case(Terminator::None, "hello")]
    #[case(Terminator::Lf, "hello\n")]
    #[case(Terminator::CrLf, "hello\r\n")]
    fn put_line_appends_the_terminator(#[case] terminator: Terminator, #[case] expected: &str) {
        let mut lines = LineStream::new(
            ScriptedConnection::new(vec![]),
            LineOptions::default().with_terminator(terminator),
        );
        let sent = lines.put_line(Timeout::from(1.0), "hello").unwrap();
        assert_eq!(sent, expected.len());
        assert_eq!(lines.get_ref().written(), expected.as_bytes());
    }

    #[test]
    fn put_line_reports_partial_progress() {
        let conn = ScriptedConnection::new(vec![]).with_write_budget(6);
        let mut lines = LineStream::new(
            conn,
            LineOptions::default().with_terminator(Terminator::CrLf),
        );
        let err = lines.put_line(Timeout::IMMEDIATE, "hello").unwrap_err();
        assert_eq!(err.transferred(), 6);
        assert_eq!(lines.get_ref().written(), b"hello\r");
    }

    #[test]
    fn raw_reads_drain_the_buffer_first() {
        let mut lines = stream(vec![Step::data(b"head\nbody"), Step::data(b"rest")]);
        assert_eq!(lines.get_line(Timeout::Forever).unwrap(), "head");

        let mut buf = [0u8; 8];
        let n = lines.read(Timeout::Forever, ReadMode::Exact, &mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf, b"bodyrest");
    }

    #[test]
    fn first_chunk_read_returns_buffered_bytes() {
        let mut lines = stream(vec![Step::data(b"x\nyz"), Step::data(b"never")]);
        lines.get_line(Timeout::Forever).unwrap();

        let mut buf = [0u8; 8];
        let n = lines
            .read(Timeout::Forever, ReadMode::FirstChunk, &mut buf)
            .unwrap();
        assert_eq!(&buf[..n], b"yz");
        assert_eq!(lines.get_ref().reads(), 1);
    }

    #[rstest]
    #[case("", Terminator::None, DEFAULT_INPUT_SIZE)]
    #[case("-lf", Terminator::Lf, DEFAULT_INPUT_SIZE)]
    #[case("-crlf -input 4096", Terminator::CrLf, 4096)]
    #[case("-input 16 -lf", Terminator::Lf, 16)]
    #[case("-lf -output 8192", Terminator::Lf, DEFAULT_INPUT_SIZE)]
    fn options_parse(#[case] text: &str, #[case] terminator: Terminator, #[case] size: usize) {
        let options: LineOptions = text.parse().unwrap();
        assert_eq!(options.terminator, terminator);
        assert_eq!(options.input_size, size);
    }

    #[rstest]
    #[case("-cr")]
    #[case("-input")]
    #[case("-input zero")]
    #[case("-input 0")]
    #[case("-output")]
    #[case("-output -1")]
    fn bad_options(#[case] text: &str) {
        assert!(matches!(
            text.parse::<LineOptions>(),
            Err(NetError::InvalidOption(_))
        ));
    }

    #[test]
    fn output_size_reaches_the_connection() {
        let options: LineOptions = "-crlf -output 8192".parse().unwrap();
        assert_eq!(options.output_size, Some(8192));
        let lines = LineStream::new(ScriptedConnection::new(vec![]), options);
        assert_eq!(lines.get_ref().send_buffer(), Some(8192));

        let lines = stream(vec![]);
        assert_eq!(lines.get_ref().send_buffer(), None);
    }

    #[test]
    fn partial_line_is_not_readable() {
        let mut lines = stream(vec![Step::data(b"par"), Step::Stall]);
        assert!(lines.get_line(Timeout::IMMEDIATE).unwrap_err().is_would_block());
        assert_eq!(lines.pending_input(), 0);
        assert!(!lines.is_readable());
    }

    #[test]
    fn close_is_idempotent() {
        let mut lines = stream(vec![]);
        lines.close();
        lines.close();
        assert!(lines.get_ref().is_closed());
        assert!(!lines.is_up());
    }

    #[test]
    fn lines_over_loopback() {
        netcall_logging::setup_log();
        let manager = TcpManager::new(WireConfig::default().with_reverse_lookup(false));
        let listener = manager.listen(None, 5).unwrap();
        let client = manager
            .connect(&format!("{}@localhost", listener.name()), ConnectMode::Blocking)
            .unwrap();
        let server = listener.accept(Timeout::from(2.0)).unwrap();

        let options: LineOptions = "-crlf".parse().unwrap();
        let mut client = LineStream::new(client, options.clone());
        let mut server = LineStream::new(server, options);

        client.put_line(Timeout::from(2.0), "HELO netcall").unwrap();
        client.put_line(Timeout::from(2.0), "QUIT").unwrap();
        assert_eq!(server.get_line(Timeout::from(2.0)).unwrap(), "HELO netcall");
        assert_eq!(server.get_line(Timeout::from(2.0)).unwrap(), "QUIT");

        assert!(server.get_line(Timeout::IMMEDIATE).unwrap_err().is_would_block());
        server.put_line(Timeout::from(2.0), "221 bye").unwrap();
        assert_eq!(client.get_line(Timeout::from(2.0)).unwrap(), "221 bye");
    }
}
