//! Language detection by file extension, plus per-language profiles used to
//! frame prompts (indentation, style guide, test framework).

use std::path::Path;

/// Tag returned when the extension is not recognized.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Profile used when no file is in scope.
pub const DEFAULT_LANGUAGE: &str = "python";

const EXTENSIONS: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("java", "java"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("c", "c"),
    ("h", "c"),
    ("go", "go"),
    ("rs", "rust"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("kt", "kotlin"),
    ("cs", "csharp"),
];

/// Detect a language tag from the file extension (case-insensitive).
pub fn detect_language(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return UNKNOWN_LANGUAGE;
    };
    let ext = ext.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or(UNKNOWN_LANGUAGE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indent {
    Spaces(u8),
    Tabs,
}

impl std::fmt::Display for Indent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Indent::Spaces(n) => write!(f, "{n} spaces"),
            Indent::Tabs => write!(f, "tabs"),
        }
    }
}

/// Formatting and tooling conventions for a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    pub indent: Indent,
    pub style_guide: &'static str,
    pub test_framework: &'static str,
    pub async_support: bool,
}

impl LanguageProfile {
    const GENERIC: LanguageProfile = LanguageProfile {
        indent: Indent::Spaces(4),
        style_guide: "Generic",
        test_framework: "Unknown",
        async_support: false,
    };

    /// Look up the profile for a language tag, falling back to a generic one.
    pub fn for_language(language: &str) -> Self {
        let (indent, style_guide, test_framework) = match language {
            "python" => (Indent::Spaces(4), "PEP 8", "pytest"),
            "javascript" | "typescript" => (Indent::Spaces(2), "ESLint/Prettier", "Jest"),
            "java" => (Indent::Spaces(4), "Google Java Style", "JUnit"),
            "cpp" => (Indent::Spaces(2), "Google C++ Style", "Google Test"),
            "go" => (Indent::Tabs, "gofmt", "testing"),
            "rust" => (Indent::Spaces(4), "rustfmt", "cargo test"),
            _ => return Self::GENERIC,
        };
        Self {
            indent,
            style_guide,
            test_framework,
            async_support: true,
        }
    }

    pub fn is_generic(&self) -> bool {
        *self == Self::GENERIC
    }
}

/// Conventional test file name for `original_file` in `language`.
pub fn test_file_name(original_file: &Path, language: &str) -> String {
    let base = original_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match language {
        "python" => format!("test_{base}.py"),
        "javascript" => format!("{base}.test.js"),
        "typescript" => format!("{base}.test.ts"),
        "java" => format!("{base}Test.java"),
        "go" => format!("{base}_test.go"),
        "rust" => format!("{base}_test.rs"),
        other => format!("{base}_test.{other}"),
    }
}
