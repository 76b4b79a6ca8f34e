use netcall_types::prelude::*;
use netcall_wire::connection::{Connection, ReadMode};
use std::cell::Cell;
use std::collections::VecDeque;

/// One scripted delivery
#[derive(Clone, Debug)]
pub(crate) enum Step {
    Data(Vec<u8>),
    /// Nothing arrives in time: a bounded wait expires here, an unbounded one skips past
    Stall,
}

impl Step {
    pub(crate) fn data(bytes: &[u8]) -> Self {
        Step::Data(bytes.to_vec())
    }
}

/// A [`Connection`] that replays scripted deliveries, so tests control exactly where the
/// receive boundaries fall. Running out of script reads as an orderly close
#[derive(Debug, Default)]
pub(crate) struct ScriptedConnection {
    steps: VecDeque<Step>,
    written: Vec<u8>,
    write_budget: Option<usize>,
    reads: usize,
    send_buffer: Cell<Option<usize>>,
    closed: bool,
}

impl ScriptedConnection {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            ..Default::default()
        }
    }

    /// Splits `bytes` into deliveries of the given sizes (the last one takes the remainder)
    pub(crate) fn chunked(bytes: &[u8], sizes: &[usize]) -> Self {
        let mut steps = Vec::new();
        let mut offset = 0;
        let mut sizes = sizes.iter().cycle();
        while offset < bytes.len() {
            let size = sizes.next().copied().unwrap_or(bytes.len()).max(1);
            let end = (offset + size).min(bytes.len());
            steps.push(Step::data(&bytes[offset..end]));
            offset = end;
        }

        Self::new(steps)
    }

    pub(crate) fn with_write_budget(mut self, budget: usize) -> Self {
        self.write_budget = Some(budget);
        self
    }

    pub(crate) fn set_write_budget(&mut self, budget: Option<usize>) {
        self.write_budget = budget;
    }

    pub(crate) fn written(&self) -> &[u8] {
        &self.written
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads
    }

    pub(crate) fn send_buffer(&self) -> Option<usize> {
        self.send_buffer.get()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Connection for ScriptedConnection {
    fn read(&mut self, timeout: Timeout, mode: ReadMode, buf: &mut [u8]) -> NetResult<usize> {
        if self.closed {
            return Err(NetError::InvalidState("endpoint is closed"));
        }

        self.reads += 1;
        let mut total = 0;
        while total < buf.len() {
            match self.steps.pop_front() {
                None => return Err(NetError::ConnectionClosed),
                Some(Step::Stall) => {
                    if total == 0 && !timeout.is_forever() {
                        return Err(NetError::would_block(0));
                    }
                }
                Some(Step::Data(data)) => {
                    let n = data.len().min(buf.len() - total);
                    buf[total..total + n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.steps.push_front(Step::Data(data[n..].to_vec()));
                    }

                    total += n;
                    if mode == ReadMode::FirstChunk && total > 0 {
                        break;
                    }
                }
            }
        }

        Ok(total)
    }

    fn write(&mut self, _timeout: Timeout, buf: &[u8]) -> NetResult<usize> {
        if self.closed {
            return Err(NetError::InvalidState("endpoint is closed"));
        }

        let accepted = self.write_budget.map_or(buf.len(), |budget| budget.min(buf.len()));
        self.written.extend_from_slice(&buf[..accepted]);
        if let Some(budget) = self.write_budget.as_mut() {
            *budget -= accepted;
        }

        if accepted < buf.len() {
            return Err(NetError::would_block(accepted));
        }

        Ok(accepted)
    }

    fn is_readable(&self) -> bool {
        !self.closed && matches!(self.steps.front(), Some(Step::Data(_)))
    }

    fn is_up(&self) -> bool {
        !self.closed
    }

    fn is_writeable(&self) -> bool {
        !self.closed && self.write_budget != Some(0)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn set_send_buffer_size(&self, size: usize) -> NetResult<()> {
        self.send_buffer.set(Some(size));
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
