use anyhow::{Result, anyhow};

/// Extracts the plain text of an in-memory PDF, pages concatenated in
/// document order. Any parse failure collapses into one generic error; the
/// caller decides how much of the flow survives it.
pub fn load_text(pdf_bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(pdf_bytes)
        .map_err(|e| anyhow!("failed to read PDF: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_an_error() {
        let result = load_text(b"this is not a pdf");
        assert!(result.is_err());
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(load_text(&[]).is_err());
    }
}
