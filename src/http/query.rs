//! Query-string and path-token decoding.
//!
//! `a=1&b=hello+world&flag` decodes to `{"a": "1", "b": "hello world", "flag": null}`.
//! Later duplicates overwrite earlier ones.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryStringError {
    #[error("invalid percent escape at byte {0}")]
    InvalidEscape(usize),

    #[error("decoded text is not valid UTF-8")]
    InvalidUtf8,
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn decode(input: &str, plus_as_space: bool) -> Result<String, QueryStringError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let high = bytes.get(i + 1).copied().and_then(hex_value);
                let low = bytes.get(i + 2).copied().and_then(hex_value);
                match (high, low) {
                    (Some(high), Some(low)) => out.push(high << 4 | low),
                    _ => return Err(QueryStringError::InvalidEscape(i)),
                }
                i += 3;
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| QueryStringError::InvalidUtf8)
}

/// Decode `%XX` escapes in a path token. `+` is kept literally.
pub fn percent_decode(input: &str) -> Result<String, QueryStringError> {
    decode(input, false)
}

/// Parse a raw query string (without the leading `?`).
pub fn parse_query_string(query: &str) -> Result<Map<String, Value>, QueryStringError> {
    let mut out = Map::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (decode(key, true)?, Value::String(decode(value, true)?)),
            None => (decode(pair, true)?, Value::Null),
        };
        out.insert(key, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query_string() {
        let parsed = parse_query_string("a=1&b=hello+world&c=%41%42&flag").unwrap();
        assert_eq!(
            Value::Object(parsed),
            json!({"a": "1", "b": "hello world", "c": "AB", "flag": null})
        );
    }

    #[test]
    fn test_later_keys_overwrite() {
        let parsed = parse_query_string("a=1&a=2&&").unwrap();
        assert_eq!(Value::Object(parsed), json!({"a": "2"}));
    }

    #[test]
    fn test_empty_value_and_encoded_key() {
        let parsed = parse_query_string("na%6De=&x=a%3Db").unwrap();
        assert_eq!(Value::Object(parsed), json!({"name": "", "x": "a=b"}));
    }

    #[test]
    fn test_invalid_escapes() {
        assert_eq!(parse_query_string("a=%G1"), Err(QueryStringError::InvalidEscape(0)));
        assert_eq!(parse_query_string("a=%4"), Err(QueryStringError::InvalidEscape(0)));
        assert_eq!(parse_query_string("a=%ff"), Err(QueryStringError::InvalidUtf8));
    }

    #[test]
    fn test_path_tokens_keep_plus() {
        assert_eq!(percent_decode("a+b%20c").unwrap(), "a+b c");
        assert_eq!(percent_decode("caf%C3%A9").unwrap(), "café");
    }
}
