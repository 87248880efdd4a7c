//! Split extracted receipt text into lines.
//!
//! Blank lines keep their position: grammars match on "the line directly
//! below", so a blank line must break that adjacency rather than vanish.

/// One line of receipt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Zero-based position in the input.
    pub index: usize,
    /// The line as printed, minus any trailing carriage return.
    pub raw: String,
    /// Trimmed text with leading `*` markers removed. Empty for blank lines.
    pub text: String,
    /// Whether the line carried a leading `*` marker.
    pub marked: bool,
}

impl RawLine {
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

pub fn tokenize(raw_text: &str) -> Vec<RawLine> {
    raw_text
        .lines()
        .enumerate()
        .map(|(index, line)| {
            let raw = line.trim_end_matches('\r');
            let trimmed = raw.trim();
            let stripped = trimmed.trim_start_matches('*');
            RawLine {
                index,
                raw: raw.to_string(),
                text: stripped.trim().to_string(),
                marked: stripped.len() != trimmed.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_strips_markers_and_whitespace() {
        let lines = tokenize("*Kiwi Guava Nocco Bcaa 33cl Påse 2\r\n 41,90\r\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Kiwi Guava Nocco Bcaa 33cl Påse 2");
        assert!(lines[0].marked);
        assert_eq!(lines[0].raw, "*Kiwi Guava Nocco Bcaa 33cl Påse 2");
        assert_eq!(lines[1].text, "41,90");
        assert!(!lines[1].marked);
    }

    #[test]
    fn test_blank_lines_keep_position() {
        let lines = tokenize("Mjölk\n   \n 13,95");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].is_blank());
        assert_eq!(lines[2].index, 2);
    }

    #[test]
    fn test_lone_marker_is_blank() {
        let lines = tokenize("**");
        assert!(lines[0].is_blank());
        assert!(lines[0].marked);
    }
}
