//! Optional CPU instruction trace ring buffer (§10.3).
//!
//! Distinct from the `log`-crate operational logging the binary installs:
//! this is a firmware-debugging aid, off by default, gated by `--log
//! FILE`/`--log-size N`. It never allocates unless enabled and costs
//! nothing on the hot path when it isn't.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::Path;

pub struct Trace {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Trace {
    pub fn new(capacity: usize) -> Trace {
        Trace { lines: VecDeque::with_capacity(capacity.min(1024)), capacity: capacity.max(1) }
    }

    /// Appends one formatted instruction line, evicting the oldest once
    /// `capacity` is exceeded (it's a ring, not an ever-growing log).
    pub fn record(&mut self, line: String) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Flushes the buffered lines to `path` in the order they were
    /// recorded. Called once, on clean shutdown.
    pub fn flush_to(&self, path: &Path) -> io::Result<()> {
        let mut f = io::BufWriter::new(std::fs::File::create(path)?);
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        f.flush()
    }

    #[cfg(test)]
    pub(crate) fn lines_for_test(&self) -> Vec<&str> {
        self.lines.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut t = Trace::new(2);
        t.record("a".into());
        t.record("b".into());
        t.record("c".into());
        assert_eq!(t.lines.len(), 2);
        assert_eq!(t.lines[0], "b");
        assert_eq!(t.lines[1], "c");
    }

    #[test]
    fn flush_writes_lines_in_order() {
        let mut t = Trace::new(8);
        t.record("first".into());
        t.record("second".into());
        let path = std::env::temp_dir().join("toumapet_trace_test.log");
        t.flush_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
        std::fs::remove_file(&path).ok();
    }
}
