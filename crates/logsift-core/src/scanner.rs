//! Chunked line splitter with a per-file carry buffer.
//!
//! Splits raw read chunks into LF-delimited lines without allocating per
//! line. Bytes after the last LF of a chunk are copied into the caller's
//! carry buffer and prepended (by extension, not re-scan) when the next
//! chunk arrives. A CR immediately before the LF is stripped whether it sits
//! in the chunk or at the end of the carry.

/// Emits every complete line in `chunk`, consuming `carry` as the prefix of
/// the first line.
///
/// The slice passed to `on_line` is valid only for the duration of the call.
/// Empty lines between delimiters are emitted as empty slices. Incomplete
/// trailing bytes are appended to `carry`; the only per-line copy happens
/// when a line spans a chunk boundary.
pub fn scan(chunk: &[u8], carry: &mut Vec<u8>, on_line: &mut dyn FnMut(&[u8])) {
    let mut start = 0;
    while let Some(pos) = find_lf(&chunk[start..]) {
        let end = start + pos;
        if carry.is_empty() {
            on_line(strip_cr(&chunk[start..end]));
        } else {
            carry.extend_from_slice(&chunk[start..end]);
            on_line(strip_cr(carry));
            carry.clear();
        }
        start = end + 1;
    }
    if start < chunk.len() {
        carry.extend_from_slice(&chunk[start..]);
    }
}

fn find_lf(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == b'\n')
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.split_last() {
        Some((b'\r', rest)) => rest,
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::scan;

    fn collect_lines(chunks: &[&[u8]]) -> (Vec<Vec<u8>>, Vec<u8>) {
        let mut carry = Vec::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            scan(chunk, &mut carry, &mut |line| lines.push(line.to_vec()));
        }
        (lines, carry)
    }

    #[test]
    fn splits_single_chunk_into_lines() {
        let (lines, carry) = collect_lines(&[b"alpha\nbeta\ngamma\n"]);
        assert_eq!(lines, vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()]);
        assert!(carry.is_empty());
    }

    #[test]
    fn retains_trailing_partial_line_in_carry() {
        let (lines, carry) = collect_lines(&[b"alpha\nbet"]);
        assert_eq!(lines, vec![b"alpha".to_vec()]);
        assert_eq!(carry, b"bet".to_vec());
    }

    #[test]
    fn joins_line_spanning_chunk_boundary() {
        let (lines, carry) = collect_lines(&[b"al", b"pha\nbeta\n"]);
        assert_eq!(lines, vec![b"alpha".to_vec(), b"beta".to_vec()]);
        assert!(carry.is_empty());
    }

    #[test]
    fn strips_cr_before_lf() {
        let (lines, _) = collect_lines(&[b"alpha\r\nbeta\n"]);
        assert_eq!(lines, vec![b"alpha".to_vec(), b"beta".to_vec()]);
    }

    #[test]
    fn strips_cr_split_across_chunk_boundary() {
        // CR lands in the carry, LF opens the next chunk.
        let (lines, carry) = collect_lines(&[b"alpha\r", b"\nbeta\n"]);
        assert_eq!(lines, vec![b"alpha".to_vec(), b"beta".to_vec()]);
        assert!(carry.is_empty());
    }

    #[test]
    fn emits_empty_lines_between_delimiters() {
        let (lines, _) = collect_lines(&[b"\n\nalpha\n\n"]);
        assert_eq!(
            lines,
            vec![Vec::new(), Vec::new(), b"alpha".to_vec(), Vec::new()]
        );
    }

    #[test]
    fn cr_alone_is_not_a_delimiter() {
        let (lines, carry) = collect_lines(&[b"alpha\rbeta\n"]);
        assert_eq!(lines, vec![b"alpha\rbeta".to_vec()]);
        assert!(carry.is_empty());
    }

    #[test]
    fn concatenating_emitted_lines_and_carry_reconstructs_input() {
        // Round-trip property: lines + '\n' + carry == input, modulo CRs
        // stripped immediately before LF.
        let input: &[&[u8]] = &[b"one\r\ntw", b"o\nthree", b"\n\ntail"];
        let mut carry = Vec::new();
        let mut rebuilt = Vec::new();
        for chunk in input {
            scan(chunk, &mut carry, &mut |line| {
                rebuilt.extend_from_slice(line);
                rebuilt.push(b'\n');
            });
        }
        rebuilt.extend_from_slice(&carry);

        let mut expected: Vec<u8> = input.concat();
        // Strip the CRs the scanner strips.
        let mut cleaned = Vec::with_capacity(expected.len());
        let mut i = 0;
        while i < expected.len() {
            if expected[i] == b'\r' && expected.get(i + 1) == Some(&b'\n') {
                i += 1;
                continue;
            }
            cleaned.push(expected[i]);
            i += 1;
        }
        expected = cleaned;
        assert_eq!(rebuilt, expected);
    }

    #[test]
    fn carry_grows_across_many_small_chunks() {
        let chunks: Vec<&[u8]> = vec![b"a"; 100];
        let mut carry = Vec::new();
        let mut count = 0;
        for chunk in &chunks {
            scan(chunk, &mut carry, &mut |_| count += 1);
        }
        assert_eq!(count, 0);
        assert_eq!(carry.len(), 100);

        scan(b"\n", &mut carry, &mut |line| {
            assert_eq!(line.len(), 100);
            count += 1;
        });
        assert_eq!(count, 1);
        assert!(carry.is_empty());
    }
}
