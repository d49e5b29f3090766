use crate::error::{Error, Result};
use crate::traits::TextExtractor;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Extractor for plain UTF-8 text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        std::str::from_utf8(body)
            .map(str::to_string)
            .map_err(|e| Error::Extraction(format!("input is not valid UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("héllo".as_bytes());
        assert_eq!(PlainTextExtractor.extract(&bytes).unwrap(), "héllo");
    }

    #[test]
    fn invalid_utf8_is_an_extraction_error() {
        let err = PlainTextExtractor.extract(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn empty_input_is_empty_text() {
        assert_eq!(PlainTextExtractor.extract(b"").unwrap(), "");
    }
}
