/// Normalizes CRLF line endings to LF.
///
/// Applied to every file read so that the rest of the pipeline (offsets,
/// fingerprints) only ever sees LF.
pub fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_owned();
    }
    text.replace("\r\n", "\n")
}
