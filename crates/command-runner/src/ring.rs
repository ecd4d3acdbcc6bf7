//! Bounded log ring for command output.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use tiller_domain::{CommandLogLine, LogStream};

/// Default retained lines per command invocation.
pub const DEFAULT_CAPACITY: usize = 2000;

struct Inner {
    lines: VecDeque<CommandLogLine>,
    next_seq: u64,
}

/// A bounded ring of captured log lines, oldest evicted first.
///
/// Sequence numbers are global per command, so a client can page with
/// `lines_after` even across evictions.
pub struct LogRing {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lines: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                next_seq: 0,
            }),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full.
    pub fn push(&self, stream: LogStream, content: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.lines.len() == self.capacity {
            inner.lines.pop_front();
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.lines.push_back(CommandLogLine {
            seq,
            stream,
            content: content.into(),
            at: Utc::now(),
        });
    }

    /// Lines with `seq > after_seq`, up to `limit`.
    pub fn lines_after(&self, after_seq: Option<u64>, limit: usize) -> Vec<CommandLogLine> {
        let inner = self.inner.lock().unwrap();
        inner
            .lines
            .iter()
            .filter(|line| after_seq.is_none_or(|after| line.seq > after))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of retained lines.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear retained lines but keep the sequence counter running.
    pub fn clear(&self) {
        self.inner.lock().unwrap().lines.clear();
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
