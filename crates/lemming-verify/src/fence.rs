//! Markdown code fence stripping.
//!
//! Models often wrap their JSON in a fenced block. Only the first block is
//! taken. A fence is a line that begins with three backticks; indented or
//! mid-line backticks are content.

const FENCE: &str = "```";

/// The body of the first fenced block in `raw`, or `raw` unchanged if there
/// is none.
///
/// An unclosed fence yields everything after the opening line. Lines are
/// split on `\n` only, so a `\r` from CRLF input stays on each line.
pub fn strip_fences(raw: &str) -> &str {
    let mut offset = 0;
    let mut body_start: Option<usize> = None;

    for line in raw.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if !line.starts_with(FENCE) {
            continue;
        }
        match body_start {
            None => body_start = Some(offset),
            Some(start) => {
                // Drop the newline that ends the last body line.
                let end = line_start.saturating_sub(1).max(start);
                return &raw[start..end];
            }
        }
    }

    match body_start {
        Some(start) => &raw[start..],
        None => raw,
    }
}
