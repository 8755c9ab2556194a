//! The PDF/document parsing library (spec §1 "Out of scope"). The ingest
//! runner calls through this trait; a real implementation would dispatch on
//! file extension and shell out to a PDF/DOCX parser.

use async_trait::async_trait;
use slab_types::RuntimeError;

#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse raw document bytes into an ordered sequence of text chunks.
    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<Vec<String>, RuntimeError>;
}

/// Splits on blank lines. Stands in for a real PDF/DOCX parser in tests and
/// for plain-text uploads, where no parsing library is needed at all.
pub struct LineChunkParser;

#[async_trait]
impl DocumentParser for LineChunkParser {
    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<Vec<String>, RuntimeError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RuntimeError::Validation(format!("{filename}: not valid utf-8: {e}")))?;
        Ok(text
            .split("\n\n")
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_on_blank_lines_and_drops_empty_chunks() {
        let parser = LineChunkParser;
        let chunks = parser.parse(b"first\n\n\nsecond part\n\nthird", "doc.txt").await.unwrap();
        assert_eq!(chunks, vec!["first", "second part", "third"]);
    }

    #[tokio::test]
    async fn rejects_non_utf8_input() {
        let parser = LineChunkParser;
        let result = parser.parse(&[0xff, 0xfe], "bad.bin").await;
        assert!(result.is_err());
    }
}
