/// Returns the first brace-balanced `{...}` span in `text`.
///
/// Quotes toggle string state unless preceded by an odd run of backslashes,
/// and braces inside strings do not count towards depth. If there is no `{`
/// or the object never closes, `text` is returned unchanged so the caller's
/// JSON parse reports the failure.
pub fn extract_balanced_json(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text;
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut backslashes = 0usize;

    // Byte scan is safe: every byte we match on is ASCII and never appears
    // inside a multi-byte UTF-8 sequence.
    for (offset, &byte) in text.as_bytes()[start..].iter().enumerate() {
        match byte {
            b'\\' => {
                backslashes += 1;
                continue;
            }
            b'"' if backslashes % 2 == 0 => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return &text[start..start + offset + 1];
                }
            }
            _ => {}
        }
        backslashes = 0;
    }

    text
}
