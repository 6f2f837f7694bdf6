use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

const BLOCK_ID_WIDTH: usize = 32;

/// Characters left alone when escaping a block id for the query string.
const BLOCK_ID_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Identifier of the `index`-th block (1-based) of blob `name`.
///
/// `name` followed by the decimal index is left-padded with zeros to 32
/// characters, base64 encoded, then percent-encoded.
pub fn block_id(name: &str, index: usize) -> String {
    let raw = format!("{:0>width$}", format!("{name}{index}"), width = BLOCK_ID_WIDTH);
    let encoded = BASE64_STANDARD.encode(raw.as_bytes());
    utf8_percent_encode(&encoded, BLOCK_ID_ENCODE_SET).to_string()
}
