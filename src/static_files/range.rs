/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a file of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Outcome of interpreting a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range: send the whole file.
    Full,
    Partial(ByteRange),
    /// The range starts at or beyond the end of the file.
    Unsatisfiable,
}

/// Interpret a single-range `Range` header for a file of `size` bytes.
///
/// Supports `bytes=a-b`, `bytes=a-` and `bytes=-n`. The end is clamped to the
/// last byte. Malformed headers, reversed ranges and multi-range requests are
/// ignored.
pub fn parse_range(header: &str, size: u64) -> RangeRequest {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    if spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return RangeRequest::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // suffix range: the last `n` bytes
        let Ok(n) = end.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if n == 0 || size == 0 {
            return RangeRequest::Unsatisfiable;
        }
        return RangeRequest::Partial(ByteRange {
            start: size.saturating_sub(n),
            end: size - 1,
        });
    }

    let Ok(start) = start.parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = if end.is_empty() {
        None
    } else {
        match end.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return RangeRequest::Full,
        }
    };
    if let Some(end) = end {
        if end < start {
            return RangeRequest::Full;
        }
    }
    if start >= size {
        return RangeRequest::Unsatisfiable;
    }
    let last = size - 1;
    RangeRequest::Partial(ByteRange {
        start,
        end: end.map_or(last, |e| e.min(last)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forms() {
        assert_eq!(
            parse_range("bytes=0-3", 10),
            RangeRequest::Partial(ByteRange { start: 0, end: 3 })
        );
        assert_eq!(
            parse_range("bytes=4-", 10),
            RangeRequest::Partial(ByteRange { start: 4, end: 9 })
        );
        assert_eq!(
            parse_range("bytes=-3", 10),
            RangeRequest::Partial(ByteRange { start: 7, end: 9 })
        );
        assert_eq!(
            parse_range("bytes=5-100", 10),
            RangeRequest::Partial(ByteRange { start: 5, end: 9 })
        );
    }

    #[test]
    fn test_ignored_and_unsatisfiable() {
        assert_eq!(parse_range("items=0-3", 10), RangeRequest::Full);
        assert_eq!(parse_range("bytes=0-1,4-5", 10), RangeRequest::Full);
        assert_eq!(parse_range("bytes=7-2", 10), RangeRequest::Full);
        assert_eq!(parse_range("bytes=x-2", 10), RangeRequest::Full);
        assert_eq!(parse_range("bytes=10-", 10), RangeRequest::Unsatisfiable);
        assert_eq!(parse_range("bytes=-0", 10), RangeRequest::Unsatisfiable);
    }

    #[test]
    fn test_content_range() {
        let r = ByteRange { start: 0, end: 3 };
        assert_eq!(r.len(), 4);
        assert_eq!(r.content_range(10), "bytes 0-3/10");
    }
}
