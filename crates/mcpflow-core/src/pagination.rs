//! Opaque offset cursors and the pure pagination function.
//!
//! A cursor encodes a zero-based offset into a stable, server-defined
//! ordering of a collection. Only the server can decode it; clients pass it
//! back verbatim. There is no cross-page consistency guarantee — each call
//! pages over the collection as it is right now.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode an offset as an opaque cursor string.
#[must_use]
pub fn encode_cursor(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(offset.to_string())
}

/// Decode a cursor back into an offset.
///
/// Anything undecodable — wrong alphabet, non-numeric payload, someone
/// else's cursor — means "start from the beginning". That leniency is
/// intentional; see the test below.
#[must_use]
pub fn decode_cursor(cursor: &str) -> usize {
    URL_SAFE_NO_PAD
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Take one page of `items`, returning the page and the cursor for the
/// next one.
///
/// The next cursor is present exactly when items remain beyond this page.
/// An offset past the end yields an empty page and no cursor.
#[must_use]
pub fn paginate<T: Clone>(
    items: &[T],
    cursor: Option<&str>,
    page_size: usize,
) -> (Vec<T>, Option<String>) {
    let offset = cursor.map(decode_cursor).unwrap_or(0);
    if offset >= items.len() {
        return (Vec::new(), None);
    }

    let end = (offset + page_size).min(items.len());
    let page = items[offset..end].to_vec();
    let next = (end < items.len()).then(|| encode_cursor(end));
    (page, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect_all(items: &[u32], page_size: usize) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let (page, next) = paginate(items, cursor.as_deref(), page_size);
            out.extend(page);
            match next {
                Some(c) => cursor = Some(c),
                None => return out,
            }
        }
    }

    #[test]
    fn cursor_round_trip() {
        for offset in [0, 1, 50, 10_000] {
            assert_eq!(decode_cursor(&encode_cursor(offset)), offset);
        }
    }

    #[test]
    fn following_cursors_yields_the_whole_collection() {
        for len in [0usize, 1, 3, 10, 11, 50] {
            let items: Vec<u32> = (0..len as u32).collect();
            assert_eq!(collect_all(&items, 3), items, "len={len}");
        }
    }

    #[test]
    fn single_page_has_no_next_cursor() {
        let items = [1, 2, 3];
        let (page, next) = paginate(&items, None, 10);
        assert_eq!(page, vec![1, 2, 3]);
        assert!(next.is_none());
    }

    #[test]
    fn offset_past_the_end_is_an_empty_page() {
        let items = [1, 2, 3];
        let far = encode_cursor(99);
        let (page, next) = paginate(&items, Some(&far), 10);
        assert!(page.is_empty());
        assert!(next.is_none());
    }

    // Documented leniency: a cursor we cannot decode starts the listing
    // over instead of erroring. Clients holding a stale or corrupted
    // cursor re-read from the top rather than wedging.
    #[test]
    fn undecodable_cursor_starts_over() {
        let items = [1, 2, 3, 4, 5];
        for garbage in ["not base64 !!!", "", "zzzz@@", "AAAA"] {
            let (page, _) = paginate(&items, Some(garbage), 2);
            assert_eq!(page, vec![1, 2], "cursor={garbage:?}");
        }
    }

    #[test]
    fn empty_collection_pages_cleanly() {
        let items: [u32; 0] = [];
        let (page, next) = paginate(&items, None, 10);
        assert!(page.is_empty());
        assert!(next.is_none());
    }
}
