//! Call streams feeding the replay driver.

use glreplay_core::{Call, CoreError, CoreResult};
use std::collections::VecDeque;
use std::io::BufRead;

/// Forward-only source of calls in capture order
pub trait CallStream {
    /// Next call, or `None` at the end of the stream
    ///
    /// # Errors
    ///
    /// Returns error if the next call cannot be decoded
    fn next_call(&mut self) -> CoreResult<Option<Call>>;
}

/// In-memory call stream
#[derive(Debug, Clone, Default)]
pub struct TraceReader {
    buffer: VecDeque<Call>,
    position: usize,
    total: usize,
}

impl TraceReader {
    /// Create an empty reader
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reader over calls already in capture order
    #[must_use]
    pub fn from_calls(calls: Vec<Call>) -> Self {
        let total = calls.len();
        Self {
            buffer: calls.into(),
            position: 0,
            total,
        }
    }

    /// Parse a JSON array of calls, or one call per line
    ///
    /// # Errors
    ///
    /// Returns a parse error naming the offending line
    pub fn from_json(text: &str) -> CoreResult<Self> {
        let trimmed = text.trim_start();
        if trimmed.starts_with('[') {
            let calls: Vec<Call> = serde_json::from_str(trimmed)?;
            return Ok(Self::from_calls(calls));
        }
        Self::from_lines(text.as_bytes())
    }

    /// Read JSON-lines calls, skipping blank lines
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure or an undecodable line
    pub fn from_lines(reader: impl BufRead) -> CoreResult<Self> {
        let mut calls = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| CoreError::ParseError {
                message: format!("line {}: {}", n + 1, e),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let call: Call = serde_json::from_str(&line).map_err(|e| CoreError::ParseError {
                message: format!("line {}: {}", n + 1, e),
            })?;
            calls.push(call);
        }
        Ok(Self::from_calls(calls))
    }

    /// Peek at the next call without consuming it
    #[must_use]
    pub fn peek(&self) -> Option<&Call> {
        self.buffer.front()
    }

    /// Check if there are more calls
    #[must_use]
    pub fn has_more(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Remaining call count
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    /// Calls consumed so far
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total call count
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }
}

impl CallStream for TraceReader {
    fn next_call(&mut self) -> CoreResult<Option<Call>> {
        let call = self.buffer.pop_front();
        if call.is_some() {
            self.position += 1;
        }
        Ok(call)
    }
}

/// Stream over any iterator of decoded calls
#[derive(Debug)]
pub struct CallIter<I>(I);

impl<I> CallIter<I>
where
    I: Iterator<Item = CoreResult<Call>>,
{
    /// Wrap an iterator
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self(iter.into_iter())
    }
}

impl<I> CallStream for CallIter<I>
where
    I: Iterator<Item = CoreResult<Call>>,
{
    fn next_call(&mut self) -> CoreResult<Option<Call>> {
        self.0.next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glreplay_core::{ThreadId, Value};

    #[test]
    fn test_trace_reader_new() {
        let reader = TraceReader::new();
        assert!(!reader.has_more());
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.total(), 0);
    }

    #[test]
    fn test_next_call_consumes_in_order() {
        let mut reader =
            TraceReader::from_calls(vec![Call::new(0, "glClear"), Call::new(1, "glFlush")]);
        assert_eq!(reader.peek().unwrap().name, "glClear");
        assert_eq!(reader.next_call().unwrap().unwrap().index, 0);
        assert_eq!(reader.next_call().unwrap().unwrap().index, 1);
        assert!(reader.next_call().unwrap().is_none());
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.total(), 2);
    }

    #[test]
    fn test_from_json_array() {
        let text = r#"[
            {"index": 0, "name": "CGLSetCurrentContext", "args": [{"type": "handle", "value": 1}]},
            {"index": 1, "thread": 2, "name": "glClear", "args": [{"type": "uint", "value": 16384}]}
        ]"#;
        let mut reader = TraceReader::from_json(text).unwrap();
        let first = reader.next_call().unwrap().unwrap();
        assert_eq!(first.args, vec![Value::Handle(1)]);
        assert_eq!(first.thread, ThreadId::default());
        let second = reader.next_call().unwrap().unwrap();
        assert_eq!(second.thread, ThreadId::from_raw(2));
    }

    #[test]
    fn test_from_json_lines() {
        let text = "{\"index\": 0, \"name\": \"glClear\"}\n\n{\"index\": 1, \"name\": \"glFlush\"}\n";
        let reader = TraceReader::from_json(text).unwrap();
        assert_eq!(reader.total(), 2);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let text = "{\"index\": 0, \"name\": \"glClear\"}\nnot json\n";
        let err = TraceReader::from_json(text).unwrap_err();
        assert!(matches!(err, CoreError::ParseError { ref message } if message.starts_with("line 2")));
    }

    #[test]
    fn test_iterator_stream_propagates_errors() {
        let items = vec![
            Ok(Call::new(0, "glClear")),
            Err(CoreError::ParseError {
                message: "truncated record".to_string(),
            }),
        ];
        let mut stream = CallIter::new(items);
        assert!(stream.next_call().unwrap().is_some());
        assert!(stream.next_call().is_err());
    }
}
