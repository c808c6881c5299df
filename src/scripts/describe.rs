//! Best-effort description extraction from a script's leading comment block.

use std::io::{BufRead, BufReader};
use std::path::Path;

use super::ScriptType;

/// Extracts a short description from the first comment or docstring block of
/// a script. Any read failure yields an empty description, never an error.
#[derive(Debug, Clone)]
pub struct ScriptDescriptionExtractor {
    max_chars: usize,
}

impl Default for ScriptDescriptionExtractor {
    fn default() -> Self {
        Self { max_chars: 500 }
    }
}

impl ScriptDescriptionExtractor {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Read up to `max_lines` leading lines and extract a description
    /// according to the script type's comment convention.
    pub fn extract(&self, script_path: &Path, script_type: ScriptType, max_lines: usize) -> String {
        let file = match std::fs::File::open(script_path) {
            Ok(f) => f,
            Err(_) => return String::new(),
        };
        let reader = BufReader::new(file);
        let lines: Vec<String> = reader
            .lines()
            .take(max_lines)
            .map_while(Result::ok)
            .collect();

        let description = match script_type {
            ScriptType::Python => self.extract_python_docstring(&lines),
            ScriptType::Shell | ScriptType::Ruby | ScriptType::Perl => {
                self.extract_hash_comments(&lines)
            }
            ScriptType::Javascript => self.extract_js_comments(&lines),
            ScriptType::Batch | ScriptType::Powershell => String::new(),
        };

        truncate_chars(&description, self.max_chars)
    }

    /// Leading triple-quoted docstring, falling back to `#` comments.
    fn extract_python_docstring(&self, lines: &[String]) -> String {
        // First non-blank, non-shebang line.
        let start = lines
            .iter()
            .position(|l| {
                let s = l.trim();
                !s.is_empty() && !s.starts_with("#!")
            })
            .unwrap_or(lines.len());

        if let Some(first) = lines.get(start) {
            let first = first.trim();
            for quote in ["\"\"\"", "'''"] {
                if let Some(rest) = first.strip_prefix(quote) {
                    // Single-line docstring.
                    if let Some(inner) = rest.find(quote).map(|i| &rest[..i]) {
                        return inner.trim().to_string();
                    }
                    // Multi-line: collect until the closing quote.
                    let mut parts: Vec<String> = Vec::new();
                    if !rest.trim().is_empty() {
                        parts.push(rest.trim().to_string());
                    }
                    for line in &lines[start + 1..] {
                        if let Some(idx) = line.find(quote) {
                            let head = line[..idx].trim();
                            if !head.is_empty() {
                                parts.push(head.to_string());
                            }
                            break;
                        }
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            parts.push(trimmed.to_string());
                        }
                    }
                    return parts.join(" ");
                }
            }
        }

        self.extract_hash_comments(lines)
    }

    /// Contiguous leading `#` comment lines, skipping the shebang.
    fn extract_hash_comments(&self, lines: &[String]) -> String {
        let mut comments: Vec<String> = Vec::new();
        let mut started = false;

        for line in lines {
            let stripped = line.trim();
            if stripped.starts_with("#!") {
                continue;
            }
            if let Some(comment) = stripped.strip_prefix('#') {
                started = true;
                let comment = comment.trim_start_matches('#').trim();
                if !comment.is_empty() {
                    comments.push(comment.to_string());
                }
            } else if started && !stripped.is_empty() {
                break;
            }
        }

        comments.join(" ")
    }

    /// Leading `//` lines and/or a leading `/* ... */` block.
    fn extract_js_comments(&self, lines: &[String]) -> String {
        let mut comments: Vec<String> = Vec::new();
        let mut in_block = false;

        for line in lines {
            let stripped = line.trim();

            if !in_block {
                if let Some(rest) = stripped.split_once("/*").map(|(_, r)| r) {
                    let comment = if let Some(idx) = rest.find("*/") {
                        &rest[..idx]
                    } else {
                        in_block = true;
                        rest
                    };
                    let comment = comment.trim().trim_matches('*').trim();
                    if !comment.is_empty() {
                        comments.push(comment.to_string());
                    }
                    continue;
                }
            } else {
                let comment = if let Some(idx) = stripped.find("*/") {
                    in_block = false;
                    &stripped[..idx]
                } else {
                    stripped
                };
                let comment = comment.trim_matches(|c: char| c == '*' || c.is_whitespace());
                if !comment.is_empty() {
                    comments.push(comment.to_string());
                }
                continue;
            }

            if let Some(comment) = stripped.strip_prefix("//") {
                let comment = comment.trim_start_matches('/').trim();
                if !comment.is_empty() {
                    comments.push(comment.to_string());
                }
            } else if !stripped.is_empty() {
                break;
            }
        }

        comments.join(" ")
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn extract(name: &str, content: &str, script_type: ScriptType) -> String {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(name);
        fs::write(&path, content).unwrap();
        ScriptDescriptionExtractor::default().extract(&path, script_type, 50)
    }

    #[test]
    fn test_python_single_line_docstring() {
        let desc = extract(
            "x.py",
            "#!/usr/bin/env python3\n\"\"\"Extract text\"\"\"\nprint('hi')\n",
            ScriptType::Python,
        );
        assert_eq!(desc, "Extract text");
    }

    #[test]
    fn test_python_multi_line_docstring() {
        let desc = extract(
            "x.py",
            "\"\"\"Extract text\nfrom PDF files.\n\"\"\"\nprint('hi')\n",
            ScriptType::Python,
        );
        assert_eq!(desc, "Extract text from PDF files.");
    }

    #[test]
    fn test_python_falls_back_to_hash_comments() {
        let desc = extract(
            "x.py",
            "#!/usr/bin/env python3\n# Process data\n# in batches\nimport sys\n",
            ScriptType::Python,
        );
        assert_eq!(desc, "Process data in batches");
    }

    #[test]
    fn test_shell_hash_comments_skip_shebang() {
        let desc = extract(
            "x.sh",
            "#!/bin/bash\n# Backup the database\necho backup\n",
            ScriptType::Shell,
        );
        assert_eq!(desc, "Backup the database");
    }

    #[test]
    fn test_shell_comments_stop_at_code() {
        let desc = extract(
            "x.sh",
            "# First part\necho hi\n# Not included\n",
            ScriptType::Shell,
        );
        assert_eq!(desc, "First part");
    }

    #[test]
    fn test_js_line_comments() {
        let desc = extract(
            "x.js",
            "// Parse JSON input\n// and emit CSV\nconsole.log('x');\n",
            ScriptType::Javascript,
        );
        assert_eq!(desc, "Parse JSON input and emit CSV");
    }

    #[test]
    fn test_js_block_comment() {
        let desc = extract(
            "x.js",
            "/* Transform records\n * into rows\n */\nconsole.log('x');\n",
            ScriptType::Javascript,
        );
        assert_eq!(desc, "Transform records into rows");
    }

    #[test]
    fn test_unknown_type_yields_empty() {
        let desc = extract("x.bat", "REM windows batch\n", ScriptType::Batch);
        assert_eq!(desc, "");
    }

    #[test]
    fn test_missing_file_yields_empty() {
        let extractor = ScriptDescriptionExtractor::default();
        let desc = extractor.extract(Path::new("/nonexistent/script.py"), ScriptType::Python, 50);
        assert_eq!(desc, "");
    }

    #[test]
    fn test_description_capped_at_max_chars() {
        let long = format!("# {}\ntrue\n", "word ".repeat(300));
        let desc = extract("x.sh", &long, ScriptType::Shell);
        assert_eq!(desc.chars().count(), 500);
    }
}
