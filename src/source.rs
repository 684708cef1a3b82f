use crate::error::StartupError;
use std::io::Read;

/// Captures the text every tab will transform. Blank input is fatal.
pub fn read_source(mut reader: impl Read) -> Result<String, StartupError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    if text.trim().is_empty() {
        return Err(StartupError::ClipboardEmpty);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_text_unchanged() {
        let text = read_source("  keep my spacing\n".as_bytes()).unwrap();
        assert_eq!(text, "  keep my spacing\n");
    }

    #[test]
    fn test_blank_input_is_clipboard_empty() {
        assert!(matches!(
            read_source(" \n\t".as_bytes()),
            Err(StartupError::ClipboardEmpty)
        ));
    }

    #[test]
    fn test_invalid_utf8_is_io_error() {
        assert!(matches!(
            read_source(&[0xff, 0xfe][..]),
            Err(StartupError::Io(_))
        ));
    }
}
