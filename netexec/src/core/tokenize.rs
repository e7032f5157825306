//! In-place request tokenizer.
//!
//! A request is one raw read from a connection. Tokens are maximal runs of
//! non-whitespace bytes; the first whitespace byte after each token is
//! overwritten with `\0` so every token is independently addressable as a
//! C-style string inside the original buffer.

/// One tokenized request, borrowing from the read buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Request<'a> {
    tokens: Vec<&'a [u8]>,
}

impl<'a> Request<'a> {
    /// All tokens in order. The first is the program, all of them form argv.
    pub fn tokens(&self) -> &[&'a [u8]] {
        &self.tokens
    }

    pub fn program(&self) -> Option<&'a [u8]> {
        self.tokens.first().copied()
    }

    /// Tokens after the program name.
    pub fn args(&self) -> &[&'a [u8]] {
        self.tokens.get(1..).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}

/// Whitespace as understood by C `isspace` in the "C" locale.
pub fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// Split `buf` into whitespace-separated tokens, terminating each in place.
///
/// Only the bytes of `buf` are read or written; callers pass exactly the
/// received prefix of their read buffer. An empty or all-whitespace buffer
/// yields an empty request.
pub fn tokenize(buf: &mut [u8]) -> Request<'_> {
    let mut spans = Vec::new();
    let mut start = None;

    for (idx, byte) in buf.iter_mut().enumerate() {
        if is_space(*byte) {
            if let Some(begin) = start.take() {
                spans.push(begin..idx);
                *byte = 0;
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(begin) = start {
        spans.push(begin..buf.len());
    }

    let buf: &[u8] = buf;
    Request {
        tokens: spans.into_iter().map(|span| &buf[span]).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn owned(request: &Request<'_>) -> Vec<String> {
        request
            .tokens()
            .iter()
            .map(|token| String::from_utf8_lossy(token).into_owned())
            .collect()
    }

    #[test]
    fn splits_on_runs_of_whitespace() {
        let mut buf = b"  ls \t-la\r\n /tmp  ".to_vec();
        let request = tokenize(&mut buf);
        assert_eq!(owned(&request), vec!["ls", "-la", "/tmp"]);
        assert_eq!(request.program(), Some(&b"ls"[..]));
        assert_eq!(request.args(), &[&b"-la"[..], &b"/tmp"[..]]);
    }

    #[test]
    fn terminates_tokens_in_place() {
        let mut buf = b"echo hello\n".to_vec();
        let len = tokenize(&mut buf).len();
        assert_eq!(len, 2);
        assert_eq!(buf, b"echo\0hello\0");
    }

    #[test]
    fn last_token_may_end_at_buffer_end() {
        let mut buf = b"true".to_vec();
        let request = tokenize(&mut buf);
        assert_eq!(owned(&request), vec!["true"]);
    }

    #[test]
    fn empty_and_blank_buffers_yield_no_tokens() {
        let mut empty: Vec<u8> = Vec::new();
        assert!(tokenize(&mut empty).is_empty());

        let mut blank = b" \t\n\x0b\x0c\r ".to_vec();
        let request = tokenize(&mut blank);
        assert!(request.is_empty());
        assert_eq!(request.program(), None);
        assert!(request.args().is_empty());
        assert_eq!(blank, b" \t\n\x0b\x0c\r ");
    }

    #[test]
    fn never_touches_bytes_past_the_received_prefix() {
        let mut buf = vec![b'x'; 16];
        buf[..9].copy_from_slice(b"echo hi \n");
        let request = tokenize(&mut buf[..9]);
        assert_eq!(owned(&request), vec!["echo", "hi"]);
        assert_eq!(&buf[9..], &[b'x'; 7]);
    }

    proptest! {
        #[test]
        fn matches_split_on_whitespace(input in "[a-z0-9 \t\n\r\x0b\x0c-]{0,64}") {
            let expected: Vec<String> = input
                .split([' ', '\t', '\n', '\r', '\x0b', '\x0c'])
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect();
            let mut buf = input.clone().into_bytes();
            let request = tokenize(&mut buf);
            prop_assert_eq!(owned(&request), expected);
        }
    }
}
