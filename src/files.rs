//! Path classification for the repository file listing.
//!
//! A "source file" is code that is expected to carry coverage: it has a
//! programming-language extension and is neither a test/fixture nor a
//! type/schema/constant/model-only file. Classification is purely by path.
use std::sync::LazyLock;

use regex::RegexSet;

const CODE_EXTENSIONS: &[&str] = &[
    // web
    "js", "jsx", "mjs", "cjs", "ts", "tsx", "vue", "svelte",
    // backend
    "py", "java", "kt", "kts", "scala", "groovy", "cs", "vb", "fs", "php", "rb", "go", "rs",
    "swift",
    // c family
    "c", "cc", "cpp", "cxx", "h", "hpp", "m", "mm",
    // mobile
    "dart",
    // functional
    "hs", "elm", "clj", "cljs", "ml", "ex", "exs", "erl", "hrl",
    // other
    "r", "jl", "lua", "pl", "pm", "sql", "graphql", "proto", "vim", "asm", "s",
    // legacy
    "pas", "pp", "f", "f90", "f95", "cobol", "cob", "cbl", "ada",
];

/// Matched against the lowercased path.
static TEST_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\.test\.",
        r"\.spec\.",
        r"test\.",
        r"tests\.",
        r"_test\.",
        r"_spec\.",
        r"^test_",
        r"/test_",
        r"^spec_",
        r"/spec_",
        r"/__tests__/",
        r"/tests?/",
        r"^tests?/",
        r"/e2e/",
        r"(^|/)cypress/",
        r"/playwright/",
        r"/spec/",
        r"/testing/",
        r"/__mocks__/",
        r"\.mock\.",
        r"mocks?\.",
        r"/__snapshots__/",
        r"\.snap$",
        r"(^|/)__fixtures__/",
        r"(^|/)fixtures/",
        r"\.fixture\.",
        r"jest\.config\.",
        r"vitest\.config\.",
        r"karma\.conf\.",
        r"(^|/)test[-_]utils?/",
        r"(^|/)test[-_]helpers?/",
        r"(^|/)setuptests\.",
        r"(^|/)testsetup\.",
        r"(^|/)test[-_]setup\.",
        r"\.stories\.",
        r"(^|/)stories/",
        r"^spec\.",
        r"^\.github/",
    ])
    .unwrap()
});

/// Matched against the lowercased path.
static TYPE_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(^|/)types?/",
        r"(^|/)schemas?/",
        r"(^|/)interfaces?/",
        r"(^|/)constants?/",
        r"(^|/)enums?/",
        // Python model modules are plain data classes
        r"(^|/)models?/[^/]+\.py$",
        r"\.(types?|schemas?|interfaces?|constants?|enums?)\.",
        r"\.d\.ts$",
        r"^types?\.",
        r"^types?_[^/]*\.",
        r"_(types?|constants?)\.",
    ])
    .unwrap()
});

/// Matched case-sensitively against the file name (`UserTypes.java`).
static TYPE_SUFFIX_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([r"[a-z0-9](Types?|Schemas?|Interfaces?|Constants?|Enums?)\.[A-Za-z0-9]+$"])
        .unwrap()
});

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// True when the path has a programming-language extension.
pub fn is_code_file(path: &str) -> bool {
    let name = file_name(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            let ext = ext.to_lowercase();
            CODE_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// True for tests, mocks, fixtures, snapshots, stories and test configuration.
pub fn is_test_file(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    TEST_PATTERNS.is_match(&path.to_lowercase())
}

/// True for type declarations, schemas, interfaces, constants, enums and
/// Python model modules.
pub fn is_type_file(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    TYPE_PATTERNS.is_match(&path.to_lowercase()) || TYPE_SUFFIX_PATTERNS.is_match(file_name(path))
}

/// Code that should carry coverage data.
pub fn is_source_file(path: &str) -> bool {
    is_code_file(path) && !is_test_file(path) && !is_type_file(path)
}
