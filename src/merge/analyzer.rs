//! Lightweight structural extraction for semantic diffing.
//!
//! Pattern-based, not compiler-grade: regexes pull imports, functions,
//! classes, and top-level variables out of file text. Good enough to classify
//! what two tasks touched; wrong answers degrade to AI or human review, never
//! to a bad auto-merge.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;

use super::types::{ChangeType, FileChangeAnalysis, SemanticChange};

/// How much of a definition body is compared when deciding whether a
/// function or class was modified.
const SNIPPET_WINDOW: usize = 400;

#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub offset: usize,
}

#[derive(Debug, Default)]
pub struct Elements {
    pub imports: Vec<Element>,
    pub functions: Vec<Element>,
    pub classes: Vec<Element>,
    pub variables: Vec<Element>,
}

struct LanguagePatterns {
    imports: Vec<Regex>,
    functions: Vec<Regex>,
    classes: Vec<Regex>,
    variables: Vec<Regex>,
}

pub struct SemanticAnalyzer {
    languages: HashMap<&'static str, LanguagePatterns>,
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        let mut languages = HashMap::new();

        let ecmascript = || LanguagePatterns {
            imports: vec![
                Regex::new(r"(?m)^[ \t]*import\s+[^;\n]+").unwrap(),
                Regex::new(r"(?m)^[ \t]*(?:const|let|var)\s+[\w{},\s$]+=\s*require\([^)]*\)")
                    .unwrap(),
            ],
            functions: vec![
                Regex::new(r"(?:async\s+)?function\s+([A-Za-z_$][\w$]*)\s*\(").unwrap(),
                Regex::new(
                    r"(?m)^[ \t]*(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)\n]*\)|[\w$]+)\s*=>",
                )
                .unwrap(),
            ],
            classes: vec![Regex::new(r"(?m)^[ \t]*(?:export\s+)?(?:default\s+)?class\s+([A-Za-z_$][\w$]*)").unwrap()],
            // Arrow functions and requires also match this; they are filtered
            // out after collection since the regex crate has no lookahead.
            variables: vec![Regex::new(
                r"(?m)^[ \t]*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=",
            )
            .unwrap()],
        };

        languages.insert("javascript", ecmascript());
        languages.insert("typescript", ecmascript());

        languages.insert(
            "python",
            LanguagePatterns {
                imports: vec![Regex::new(
                    r"(?m)^[ \t]*(?:import\s+\S+(?:\s+as\s+\w+)?|from\s+\S+\s+import\s+[^\n]+)",
                )
                .unwrap()],
                functions: vec![Regex::new(r"(?m)^[ \t]*(?:async\s+)?def\s+([A-Za-z_]\w*)").unwrap()],
                classes: vec![Regex::new(r"(?m)^[ \t]*class\s+([A-Za-z_]\w*)").unwrap()],
                variables: vec![Regex::new(r"(?m)^([A-Z_][A-Z0-9_]*)\s*=").unwrap()],
            },
        );

        languages.insert(
            "rust",
            LanguagePatterns {
                imports: vec![Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?use\s+[^;]+;").unwrap()],
                functions: vec![Regex::new(
                    r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+([A-Za-z_]\w*)",
                )
                .unwrap()],
                classes: vec![Regex::new(
                    r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+([A-Za-z_]\w*)",
                )
                .unwrap()],
                variables: vec![Regex::new(
                    r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?(?:static|const)\s+([A-Z_][A-Z0-9_]*)",
                )
                .unwrap()],
            },
        );

        Self { languages }
    }

    /// Map a file extension (with or without the leading dot) to a language
    /// identifier. Unknown extensions are treated as plain text.
    pub fn detect_language(&self, extension: &str) -> &'static str {
        match extension.trim_start_matches('.') {
            "js" | "jsx" | "mjs" | "cjs" => "javascript",
            "ts" | "tsx" => "typescript",
            "py" => "python",
            "rs" => "rust",
            "css" | "scss" | "less" => "css",
            "json" => "json",
            _ => "text",
        }
    }

    pub fn language_for_path(&self, path: &str) -> &'static str {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        self.detect_language(extension)
    }

    /// Extract structural elements from file text. Languages without
    /// patterns yield empty element sets.
    pub fn extract_elements(&self, content: &str, language: &str) -> Elements {
        let mut elements = Elements::default();
        if content.is_empty() {
            return elements;
        }
        let Some(patterns) = self.languages.get(language) else {
            return elements;
        };

        for regex in &patterns.imports {
            for m in regex.find_iter(content) {
                let text = m.as_str().trim().to_string();
                elements.imports.push(Element {
                    name: extract_import_source(&text),
                    text,
                    offset: m.start(),
                });
            }
        }

        collect_named(&patterns.functions, content, &mut elements.functions);
        collect_named(&patterns.classes, content, &mut elements.classes);
        collect_named(&patterns.variables, content, &mut elements.variables);

        // A `const f = () => ...` is a function, a `const x = require(...)`
        // is an import; drop both from the variable list.
        elements.variables.retain(|v| {
            let first_line = v.text.lines().next().unwrap_or("");
            !first_line.contains("=>") && !first_line.contains("require(")
        });

        elements
    }

    /// Diff two versions of a file into a typed change list.
    pub fn analyze_diff(
        &self,
        file_path: &str,
        base: &str,
        modified: &str,
        task_id: &str,
    ) -> FileChangeAnalysis {
        let language = self.language_for_path(file_path);
        let mut changes = Vec::new();
        let mut functions_added = Vec::new();
        let mut functions_removed = Vec::new();

        if self.languages.contains_key(language) {
            let before = self.extract_elements(base, language);
            let after = self.extract_elements(modified, language);

            diff_elements(
                &before.imports,
                &after.imports,
                ChangeType::ImportAdded,
                Some(ChangeType::ImportRemoved),
                None,
                modified,
                base,
                &mut changes,
            );

            diff_elements(
                &before.functions,
                &after.functions,
                ChangeType::FunctionAdded,
                Some(ChangeType::FunctionRemoved),
                Some(ChangeType::FunctionModified),
                modified,
                base,
                &mut changes,
            );

            diff_elements(
                &before.classes,
                &after.classes,
                ChangeType::ClassAdded,
                Some(ChangeType::ClassRemoved),
                None,
                modified,
                base,
                &mut changes,
            );

            // Variable removals have no dedicated change type; only additions
            // and in-place edits are tracked.
            diff_elements(
                &before.variables,
                &after.variables,
                ChangeType::VariableAdded,
                None,
                Some(ChangeType::VariableModified),
                modified,
                base,
                &mut changes,
            );

            for change in &changes {
                match change.change_type {
                    ChangeType::FunctionAdded => functions_added.push(change.target.clone()),
                    ChangeType::FunctionRemoved => functions_removed.push(change.target.clone()),
                    _ => {}
                }
            }
        } else if base != modified {
            // Opaque content: record a single unclassified change so the
            // detector still sees the collision.
            changes.push(SemanticChange {
                change_type: ChangeType::Unknown,
                target: "content".to_string(),
                location: "line 1".to_string(),
            });
        }

        FileChangeAnalysis {
            file_path: file_path.to_string(),
            task_id: task_id.to_string(),
            language: language.to_string(),
            changes,
            functions_added,
            functions_removed,
            lines_changed: count_changed_lines(base, modified),
        }
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_named(patterns: &[Regex], content: &str, out: &mut Vec<Element>) {
    for regex in patterns {
        for caps in regex.captures_iter(content) {
            let Some(name) = caps.get(1) else { continue };
            let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let end = (offset + SNIPPET_WINDOW).min(content.len());
            let end = floor_char_boundary(content, end);
            if out.iter().any(|e| e.name == name.as_str()) {
                continue;
            }
            out.push(Element {
                name: name.as_str().to_string(),
                text: content[offset..end].to_string(),
                offset,
            });
        }
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[allow(clippy::too_many_arguments)]
fn diff_elements(
    before: &[Element],
    after: &[Element],
    added: ChangeType,
    removed: Option<ChangeType>,
    modified: Option<ChangeType>,
    modified_content: &str,
    base_content: &str,
    out: &mut Vec<SemanticChange>,
) {
    for element in after {
        match before.iter().find(|e| e.name == element.name) {
            None => out.push(SemanticChange {
                change_type: added,
                target: element.name.clone(),
                location: line_of_offset(modified_content, element.offset),
            }),
            Some(original) => {
                if let Some(modified_type) = modified {
                    if original.text != element.text {
                        out.push(SemanticChange {
                            change_type: modified_type,
                            target: element.name.clone(),
                            location: line_of_offset(modified_content, element.offset),
                        });
                    }
                }
            }
        }
    }

    let Some(removed_type) = removed else { return };
    for element in before {
        if !after.iter().any(|e| e.name == element.name) {
            out.push(SemanticChange {
                change_type: removed_type,
                target: element.name.clone(),
                location: line_of_offset(base_content, element.offset),
            });
        }
    }
}

/// Absolute difference in line counts between two versions.
///
/// Both sides are counted as `split('\n')` segments, so empty text counts as
/// one line; a heuristic proxy for edit size, not a real diff.
pub fn count_changed_lines(before: &str, after: &str) -> usize {
    let before_lines = before.split('\n').count();
    let after_lines = after.split('\n').count();
    before_lines.abs_diff(after_lines)
}

/// Pull the module source out of an import statement.
///
/// Falls back to the whole statement when no source can be isolated.
pub fn extract_import_source(statement: &str) -> String {
    // `import x from 'lodash'` / `require('lodash')`
    if statement.contains(" from ") || statement.contains("require(") {
        if let Some(quoted) = first_quoted(statement) {
            return quoted;
        }
    }

    // Python `from os.path import join` / `import os`
    let trimmed = statement.trim();
    if let Some(rest) = trimmed.strip_prefix("from ") {
        if !rest.contains(['\'', '"']) {
            if let Some(module) = rest.split_whitespace().next() {
                return module.to_string();
            }
        }
    }
    if let Some(rest) = trimmed.strip_prefix("import ") {
        if !rest.contains(['\'', '"']) {
            if let Some(module) = rest.split_whitespace().next() {
                return module.trim_end_matches(';').to_string();
            }
        }
    }

    // Rust `use a::b::c;`
    if let Some(rest) = trimmed
        .strip_prefix("pub use ")
        .or_else(|| trimmed.strip_prefix("use "))
    {
        return rest.trim_end_matches(';').trim().to_string();
    }

    trimmed.to_string()
}

fn first_quoted(text: &str) -> Option<String> {
    let start = text.find(['\'', '"'])?;
    let quote = text.as_bytes()[start] as char;
    let rest = &text[start + 1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

/// 1-based "line N" label for a byte offset into content.
pub fn line_of_offset(content: &str, offset: usize) -> String {
    let clamped = offset.min(content.len());
    let line = content[..clamped].matches('\n').count() + 1;
    format!("line {line}")
}
