//! Byte-level line handling shared by the BED, bedRMod and toolkit readers.
//!
//! Lines stay borrowed slices until a typed record is built from them in
//! [`crate::bed`] or [`crate::euf`].

use memchr::memchr_iter;

/// Unsigned decimal, digits only. `None` on empty input, any other byte, or
/// overflow.
#[inline(always)]
pub fn parse_u64_fast(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0u64, |n, &b| {
        let digit = b.wrapping_sub(b'0');
        if digit > 9 {
            return None;
        }
        n.checked_mul(10)?.checked_add(u64::from(digit))
    })
}

/// Tab-separated columns of one line; the line terminator is not part of
/// the last column.
#[inline]
pub fn split_fields(line: &[u8]) -> Vec<&[u8]> {
    let line = trim_line_end(line);
    let mut fields = Vec::with_capacity(12);
    let mut from = 0;
    for tab in memchr_iter(b'\t', line) {
        fields.push(&line[from..tab]);
        from = tab + 1;
    }
    fields.push(&line[from..]);
    fields
}

/// Drop a trailing `\n`, `\r\n` or stray `\r`.
#[inline(always)]
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let keep = line
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r')
        .map_or(0, |i| i + 1);
    &line[..keep]
}

/// Lines that carry no record: blank, `#` header/comment, UCSC `track` and
/// `browser` lines.
#[inline(always)]
pub fn should_skip_line(line: &[u8]) -> bool {
    match line.first() {
        None | Some(b'#') => true,
        Some(b't') => line.starts_with(b"track"),
        Some(b'b') => line.starts_with(b"browser"),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u64_fast() {
        assert_eq!(parse_u64_fast(b"65420"), Some(65420));
        assert_eq!(parse_u64_fast(b"0"), Some(0));
        assert_eq!(parse_u64_fast(b""), None);
        assert_eq!(parse_u64_fast(b"1e3"), None);
        assert_eq!(parse_u64_fast(b"-1"), None);
        assert_eq!(parse_u64_fast(b"18446744073709551615"), Some(u64::MAX));
        assert_eq!(parse_u64_fast(b"18446744073709551616"), None);
    }

    #[test]
    fn test_split_fields() {
        let fields = split_fields(b"1\t10\t11\tm6A\r\n");
        assert_eq!(fields, vec![&b"1"[..], b"10", b"11", b"m6A"]);
        assert_eq!(split_fields(b"a"), vec![&b"a"[..]]);
        assert_eq!(split_fields(b"a\t\n"), vec![&b"a"[..], b""]);
    }

    #[test]
    fn test_trim_line_end() {
        assert_eq!(trim_line_end(b"chr1\r\n"), b"chr1");
        assert_eq!(trim_line_end(b"\n"), b"");
        assert_eq!(trim_line_end(b"x"), b"x");
    }

    #[test]
    fn test_should_skip_line() {
        assert!(should_skip_line(b""));
        assert!(should_skip_line(b"#fileformat=bedRModv1.8"));
        assert!(should_skip_line(b"track name=m6A"));
        assert!(should_skip_line(b"browser position chr1"));
        assert!(!should_skip_line(b"tRNA-1\t10\t20"));
        assert!(!should_skip_line(b"1\t100\t200"));
    }
}
