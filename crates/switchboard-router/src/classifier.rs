//! Operation classification.
//!
//! The router needs two things it cannot read directly off an operation:
//! which domains it touches and how complex it is. Both come from an
//! [`OperationClassifier`]; [`KeywordClassifier`] is the default heuristic
//! over tool names, file extensions, and argument size.

use serde_json::{Map, Value};

use crate::errors::Result;

/// Derived routing hints for one operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classification {
    /// Domains the operation touches, sorted and de-duplicated.
    pub domain_hints: Vec<String>,
    /// Complexity estimate in `[0, 1]`.
    pub complexity: f64,
}

/// Swappable classification strategy.
pub trait OperationClassifier: Send + Sync {
    /// Derive domain hints and complexity from an operation name and its arguments.
    fn classify(&self, name: &str, arguments: &Map<String, Value>) -> Result<Classification>;
}

/// Argument keys that commonly carry a file path.
const PATH_KEYS: &[&str] = &["file_path", "filePath", "path", "notebook_path"];

/// Argument bytes at which the size contribution to complexity saturates.
const SIZE_SATURATION: f64 = 10_000.0;

/// Largest complexity contribution from argument size.
const SIZE_WEIGHT: f64 = 0.3;

/// Keyword heuristics over tool names and arguments.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    fn name_domains(name: &str, out: &mut Vec<String>) {
        let domain = match name {
            "Read" | "Glob" | "Grep" | "LS" | "NotebookRead" => Some("filesystem"),
            "Edit" | "MultiEdit" | "Write" | "NotebookEdit" => Some("code"),
            "Task" | "TodoWrite" | "TodoRead" => Some("planning"),
            "Bash" => Some("system"),
            "WebFetch" | "WebSearch" => Some("research"),
            _ => None,
        };
        if let Some(domain) = domain {
            out.push(domain.to_string());
        }

        let lower = name.to_lowercase();
        for (keyword, domain) in [
            ("lint", "quality"),
            ("test", "testing"),
            ("validate", "quality"),
            ("component", "ui"),
            ("prd", "tasks"),
            ("analy", "analysis"),
            ("architect", "architecture"),
            ("perf", "performance"),
        ] {
            if lower.contains(keyword) {
                out.push(domain.to_string());
            }
        }
    }

    fn path_domains(arguments: &Map<String, Value>, out: &mut Vec<String>) {
        let paths = PATH_KEYS
            .iter()
            .filter_map(|key| arguments.get(*key).and_then(Value::as_str));
        for path in paths {
            let lower = path.to_lowercase();
            let ext = lower.rsplit_once('.').map_or("", |(_, ext)| ext);
            if matches!(ext, "tsx" | "jsx" | "vue" | "svelte" | "css" | "scss" | "html") {
                out.push("ui".into());
                out.push("frontend".into());
            }
            if lower.contains(".test.") || lower.contains(".spec.") || lower.contains("_test.") {
                out.push("testing".into());
            }
            if lower.ends_with("prd.md") || lower.contains("/prd/") {
                out.push("tasks".into());
            }
        }
    }

    fn base_complexity(name: &str) -> f64 {
        match name {
            "Read" | "Glob" | "Grep" | "LS" | "NotebookRead" | "TodoRead" => 0.1,
            "Edit" | "Write" | "WebFetch" | "WebSearch" | "TodoWrite" => 0.3,
            "MultiEdit" | "Bash" | "NotebookEdit" => 0.4,
            "Task" => 0.6,
            _ => 0.3,
        }
    }
}

impl OperationClassifier for KeywordClassifier {
    fn classify(&self, name: &str, arguments: &Map<String, Value>) -> Result<Classification> {
        let mut domain_hints = Vec::new();
        Self::name_domains(name, &mut domain_hints);
        Self::path_domains(arguments, &mut domain_hints);
        domain_hints.sort();
        domain_hints.dedup();

        let explicit = arguments.get("complexity").and_then(Value::as_f64);
        let complexity = if let Some(value) = explicit {
            value
        } else {
            #[allow(clippy::cast_precision_loss)]
            let size = serde_json::to_string(arguments).map_or(0, |s| s.len()) as f64;
            let size_factor = (size / SIZE_SATURATION).min(1.0) * SIZE_WEIGHT;
            #[allow(clippy::cast_precision_loss)]
            let breadth = domain_hints.len().saturating_sub(1) as f64 * 0.1;
            Self::base_complexity(name) + size_factor + breadth
        };

        Ok(Classification {
            domain_hints,
            complexity: complexity.clamp(0.0, 1.0),
        })
    }
}
