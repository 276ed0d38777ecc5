//! Inbound wire format: one sample per ASCII line, nine whitespace-separated
//! decimal integers in the order acc xyz, mag xyz, gyro xyz. Anything else
//! on the link is line noise and is dropped without comment.

use std::io::{self, BufRead};

use crate::types::RawSample;

/// Parse one line into a sample; `None` for any malformed line (wrong field
/// count, non-integer field).
pub fn parse_line(line: &str) -> Option<RawSample> {
    let mut fields = [0i32; 9];
    let mut count = 0;
    for token in line.split_whitespace() {
        if count == 9 {
            return None;
        }
        fields[count] = token.parse().ok()?;
        count += 1;
    }
    if count != 9 {
        return None;
    }
    Some(RawSample {
        acc: [fields[0], fields[1], fields[2]],
        mag: [fields[3], fields[4], fields[5]],
        rot: [fields[6], fields[7], fields[8]],
    })
}

/// Pulls complete samples out of a byte stream, silently skipping malformed
/// lines and counting them.
pub struct SampleReader<R> {
    inner: R,
    buf: Vec<u8>,
    pub discarded: u64,
}

impl<R: BufRead> SampleReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(128),
            discarded: 0,
        }
    }

    /// Next well-formed sample, `Ok(None)` at end of stream.
    ///
    /// Transport errors (including read timeouts on a quiet link) surface
    /// as `Err`; the partial line is dropped so the caller can simply retry.
    pub fn next_sample(&mut self) -> io::Result<Option<RawSample>> {
        loop {
            self.buf.clear();
            let n = self.inner.read_until(b'\n', &mut self.buf)?;
            if n == 0 {
                return Ok(None);
            }
            let line = String::from_utf8_lossy(&self.buf);
            match parse_line(&line) {
                Some(sample) => return Ok(Some(sample)),
                None => self.discarded += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_good_line() {
        let sample = parse_line("1 -2 3 4 5 -6 7 8 9\n").unwrap();
        assert_eq!(sample.acc, [1, -2, 3]);
        assert_eq!(sample.mag, [4, 5, -6]);
        assert_eq!(sample.rot, [7, 8, 9]);
    }

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        let sample = parse_line("  1\t2  3 4 5 6 7 8 9 \r\n").unwrap();
        assert_eq!(sample.acc, [1, 2, 3]);
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        assert!(parse_line("1 2 3 4 5 6 7 8\n").is_none());
        assert!(parse_line("1 2 3 4 5 6 7 8 9 10\n").is_none());
        assert!(parse_line("\n").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn test_parse_rejects_non_integer_fields() {
        assert!(parse_line("1 2 3 4 5 6 7 8 x\n").is_none());
        assert!(parse_line("1.5 2 3 4 5 6 7 8 9\n").is_none());
    }

    #[test]
    fn test_reader_skips_noise_lines() {
        let data = "garbage\n1 2 3 4 5 6 7 8 9\n1 2\n9 8 7 6 5 4 3 2 1\n";
        let mut reader = SampleReader::new(Cursor::new(data));

        let first = reader.next_sample().unwrap().unwrap();
        assert_eq!(first.acc, [1, 2, 3]);
        let second = reader.next_sample().unwrap().unwrap();
        assert_eq!(second.acc, [9, 8, 7]);
        assert!(reader.next_sample().unwrap().is_none());
        assert_eq!(reader.discarded, 2);
    }

    #[test]
    fn test_reader_survives_invalid_utf8() {
        let mut data = vec![0xff, 0xfe, b'\n'];
        data.extend_from_slice(b"1 2 3 4 5 6 7 8 9\n");
        let mut reader = SampleReader::new(Cursor::new(data));
        let sample = reader.next_sample().unwrap().unwrap();
        assert_eq!(sample.rot, [7, 8, 9]);
        assert_eq!(reader.discarded, 1);
    }
}
