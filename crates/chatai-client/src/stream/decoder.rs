//! Incremental UTF-8 decoding of response chunks.

const REPLACEMENT: char = '\u{FFFD}';

/// Decodes a byte stream chunk by chunk. A multi-byte character split across
/// two chunks is held back until its remaining bytes arrive.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    incomplete_utf8: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning every complete character.
    ///
    /// Invalid sequences are replaced with U+FFFD rather than failing the
    /// stream.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.incomplete_utf8);
        bytes.extend_from_slice(chunk);

        let mut text = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(REPLACEMENT);
                            rest = &after[len..];
                        }
                        None => {
                            self.incomplete_utf8 = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    /// Flush at end of stream. A dangling partial character becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.incomplete_utf8.is_empty() {
            return String::new();
        }
        self.incomplete_utf8.clear();
        REPLACEMENT.to_string()
    }

    /// Number of bytes waiting for the rest of their character.
    pub fn pending(&self) -> usize {
        self.incomplete_utf8.len()
    }
}
