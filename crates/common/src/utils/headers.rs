use crate::error::{ListenError, Result};
use crate::models::CustomHeader;

/// Parse `Name:value` strings into rule custom headers
///
/// Names and values are trimmed; the value may itself contain colons.
/// Returns `None` when no headers were supplied, and fails on the first
/// entry without a colon rather than returning a partial list.
pub fn parse_custom_headers<S: AsRef<str>>(raw: &[S]) -> Result<Option<Vec<CustomHeader>>> {
    if raw.is_empty() {
        return Ok(None);
    }

    raw.iter()
        .map(|header| {
            let header = header.as_ref();
            let (name, value) = header
                .split_once(':')
                .ok_or_else(|| ListenError::InvalidHeader(header.to_string()))?;
            Ok(CustomHeader::new(name.trim(), value.trim()))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_custom_headers_empty() {
        let raw: Vec<String> = vec![];
        assert!(parse_custom_headers(&raw).unwrap().is_none());
    }

    #[test]
    fn test_parse_custom_headers_trims() {
        let headers = parse_custom_headers(&["X-Foo:bar", "X-Baz: qux"])
            .unwrap()
            .unwrap();
        assert_eq!(
            headers,
            vec![CustomHeader::new("X-Foo", "bar"), CustomHeader::new("X-Baz", "qux")]
        );
    }

    #[test]
    fn test_parse_custom_headers_value_with_colon() {
        let headers = parse_custom_headers(&[" X-Origin : https://example.com:8443 "])
            .unwrap()
            .unwrap();
        assert_eq!(headers[0].name, "X-Origin");
        assert_eq!(headers[0].value, "https://example.com:8443");
    }

    #[test]
    fn test_parse_custom_headers_preserves_order() {
        let headers = parse_custom_headers(&["B:2", "A:1", "C:3"]).unwrap().unwrap();
        let names: Vec<_> = headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_parse_custom_headers_malformed() {
        let err = parse_custom_headers(&["X-Foo:bar", "NoColonHere"]).unwrap_err();
        assert!(matches!(err, ListenError::InvalidHeader(ref h) if h == "NoColonHere"));
    }
}
