use std::collections::HashSet;

/// Find the largest valid UTF-8 boundary at or before the given byte index.
#[inline]
fn safe_byte_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    s.char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_bytes)
        .last()
        .unwrap_or(0)
}

/// Truncate a string with a marker if it exceeds the maximum length (UTF-8 safe).
#[inline]
pub fn truncate_with_marker(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let boundary = safe_byte_boundary(s, max_len);
        format!("{}...[truncated]", &s[..boundary])
    }
}

/// Words too common to carry signal when matching task descriptions.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "into", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were",
    "will", "with",
];

/// Extract significant lowercase keywords from free text.
///
/// Filters stopwords and tokens shorter than three characters.
pub fn significant_keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Count keywords shared between two pieces of free text.
pub fn keyword_overlap(a: &str, b: &str) -> usize {
    let a_words = significant_keywords(a);
    let b_words = significant_keywords(b);
    a_words.intersection(&b_words).count()
}

/// Best-effort scan of free text for path-like tokens, bounded by `limit`.
///
/// A heuristic stopgap until workers report structured file lists; kept
/// behind one function so it can be swapped out wholesale.
pub fn extract_path_tokens(output: &str, limit: usize) -> Vec<String> {
    if output.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut files = Vec::new();

    for line in output.lines() {
        if line.len() > 10_000 {
            continue;
        }

        for token in line.split_whitespace() {
            let cleaned = token.trim_matches(|c: char| {
                matches!(
                    c,
                    '`' | '"'
                        | '\''
                        | ','
                        | ':'
                        | ';'
                        | '('
                        | ')'
                        | '['
                        | ']'
                        | '{'
                        | '}'
                        | '<'
                        | '>'
                )
            });

            if looks_like_path(cleaned) {
                let path = cleaned.to_string();
                if !files.contains(&path) {
                    files.push(path);
                    if files.len() >= limit {
                        return files;
                    }
                }
            }
        }
    }

    files
}

fn looks_like_path(token: &str) -> bool {
    token.len() > 2
        && token.len() < 4096
        && (token.contains('/') || (token.contains('.') && !token.starts_with('.')))
        && !token.starts_with("http")
        && !token.starts_with("//")
        && !token.contains("://")
        && !token.contains('\0')
        && !token.ends_with('.')
        && token.chars().all(|c| !c.is_control() || c == '\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_marker_short() {
        assert_eq!(truncate_with_marker("short", 100), "short");
    }

    #[test]
    fn test_truncate_with_marker_long() {
        let long = "x".repeat(600);
        let out = truncate_with_marker(&long, 500);
        assert!(out.len() < 600);
        assert!(out.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let s = "héllo wörld";
        // Must not panic on a boundary inside a multi-byte char.
        let out = truncate_with_marker(s, 2);
        assert!(out.starts_with('h'));
    }

    #[test]
    fn test_significant_keywords_filters_stopwords() {
        let words = significant_keywords("handle the connection timeout error");
        assert!(words.contains("connection"));
        assert!(words.contains("timeout"));
        assert!(!words.contains("the"));
    }

    #[test]
    fn test_keyword_overlap() {
        let overlap = keyword_overlap(
            "connection timeout error handling",
            "handle connection timeout error gracefully",
        );
        assert!(overlap >= 2);
        assert_eq!(keyword_overlap("quantum physics", "build login form"), 0);
    }

    #[test]
    fn test_extract_path_tokens() {
        let output = "Created `src/app.js` and modified 'lib/utils.ts'";
        let files = extract_path_tokens(output, 10);
        assert!(files.contains(&"src/app.js".to_string()));
        assert!(files.contains(&"lib/utils.ts".to_string()));
    }

    #[test]
    fn test_extract_path_tokens_rejects_noise() {
        assert!(extract_path_tokens("", 10).is_empty());
        assert!(extract_path_tokens("see https://example.com/x.js today", 10).is_empty());
        assert!(extract_path_tokens("plain words only here", 10).is_empty());
    }

    #[test]
    fn test_extract_path_tokens_respects_limit() {
        let output = "a/b.rs c/d.rs e/f.rs";
        assert_eq!(extract_path_tokens(output, 2).len(), 2);
    }

    #[test]
    fn test_extract_path_tokens_multiple_lines() {
        let output = "Modified:\n  src/main.rs\n  src/lib.rs\n  tests/test.rs";
        let files = extract_path_tokens(output, 10);
        assert!(files.contains(&"src/main.rs".to_string()));
        assert!(files.contains(&"src/lib.rs".to_string()));
        assert!(files.contains(&"tests/test.rs".to_string()));
    }
}
