//! HTTP/1.x text payload carried inside a frame

use std::ops::Range;

/// Raw request or response bytes: start line, headers, blank line, body.
///
/// Edits are applied in place so untouched bytes stay identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPayload(Vec<u8>);

impl HttpPayload {
    /// Wrap raw payload bytes
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into raw bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// First line without its terminator
    #[must_use]
    pub fn start_line(&self) -> &[u8] {
        let end = line_end(&self.0, 0);
        trim_cr(&self.0[..end])
    }

    fn start_line_token(&self, index: usize) -> Option<&[u8]> {
        self.start_line()
            .split(|&b| b == b' ')
            .filter(|token| !token.is_empty())
            .nth(index)
    }

    /// Request method, e.g. `POST`
    #[must_use]
    pub fn method(&self) -> Option<&[u8]> {
        if self.is_response() {
            return None;
        }
        self.start_line_token(0)
    }

    /// Request target, e.g. `/api/v2/problem/main?x=1`
    #[must_use]
    pub fn path(&self) -> Option<&[u8]> {
        if self.is_response() {
            return None;
        }
        self.start_line_token(1)
    }

    /// Response status code
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        if !self.is_response() {
            return None;
        }
        let token = self.start_line_token(1)?;
        std::str::from_utf8(token).ok()?.parse().ok()
    }

    /// Whether the start line is a status line
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.start_line().starts_with(b"HTTP/")
    }

    /// Value of the first header called `name` (case-insensitive), trimmed
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.header_value_range(name).map(|range| &self.0[range])
    }

    /// Header value as UTF-8 text
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Replace the value of header `name`, or add it after the start line.
    pub fn set_header(&mut self, name: &str, value: &[u8]) {
        if let Some(range) = self.header_value_range(name) {
            self.replace_range(range, value);
            return;
        }

        let first_end = line_end(&self.0, 0);
        let crlf = first_end > 0 && self.0.get(first_end - 1) == Some(&b'\r');
        let insert_at = (first_end + 1).min(self.0.len());

        let mut line = Vec::with_capacity(name.len() + value.len() + 4);
        if insert_at == self.0.len() && self.0.last() != Some(&b'\n') {
            line.extend_from_slice(if crlf { b"\r\n" } else { b"\n" });
        }
        line.extend_from_slice(name.as_bytes());
        line.extend_from_slice(b": ");
        line.extend_from_slice(value);
        line.extend_from_slice(if crlf { b"\r\n" } else { b"\n" });

        self.replace_range(insert_at..insert_at, &line);
    }

    fn replace_range(&mut self, range: Range<usize>, with: &[u8]) {
        let tail = self.0.split_off(range.end);
        self.0.truncate(range.start);
        self.0.extend_from_slice(with);
        self.0.extend_from_slice(&tail);
    }

    /// Everything after the blank line separating headers from body
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.0[self.body_start()..]
    }

    /// Replace the body. `Content-Length` is left to the caller.
    pub fn set_body(&mut self, body: &[u8]) {
        let start = self.body_start();
        self.0.truncate(start);
        self.0.extend_from_slice(body);
    }

    /// Offset of the first body byte, or the payload length if there is no
    /// header terminator.
    fn body_start(&self) -> usize {
        let mut offset = 0;
        while offset < self.0.len() {
            let end = line_end(&self.0, offset);
            if offset > 0 && trim_cr(&self.0[offset..end]).is_empty() {
                return (end + 1).min(self.0.len());
            }
            offset = end + 1;
        }
        self.0.len()
    }

    fn header_value_range(&self, name: &str) -> Option<Range<usize>> {
        let headers_end = self.body_start();
        let mut offset = line_end(&self.0, 0) + 1;

        while offset < headers_end {
            let end = line_end(&self.0, offset);
            let line = trim_cr(&self.0[offset..end]);
            if line.is_empty() {
                break;
            }

            if let Some(colon) = line.iter().position(|&b| b == b':') {
                if line[..colon].trim_ascii().eq_ignore_ascii_case(name.as_bytes()) {
                    let mut start = offset + colon + 1;
                    let mut stop = offset + line.len();
                    while start < stop && matches!(self.0[start], b' ' | b'\t') {
                        start += 1;
                    }
                    while stop > start && matches!(self.0[stop - 1], b' ' | b'\t') {
                        stop -= 1;
                    }
                    return Some(start..stop);
                }
            }
            offset = end + 1;
        }
        None
    }
}

/// Index of the `\n` ending the line that starts at `from`, or the buffer end
fn line_end(buf: &[u8], from: usize) -> usize {
    buf[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(buf.len(), |pos| from + pos)
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
