//! File-scope variable collection
//!
//! First pass of the pipeline: enumerates the global names visible to
//! user code. The front-end only parses the main translation unit, so
//! every file-scope declaration it reports belongs to user code.

use hybridc_frontend::TranslationUnit;
use std::collections::BTreeSet;

/// Collect the names of all file-scope variables.
pub fn collect_globals(tu: &TranslationUnit) -> BTreeSet<String> {
    tu.globals.iter().map(|g| g.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridc_frontend::{Parser, SourceFile};

    fn globals_of(src: &str) -> BTreeSet<String> {
        let sf = SourceFile::new(src);
        let tu = Parser::new(&sf).parse().unwrap();
        collect_globals(&tu)
    }

    #[test]
    fn test_collects_file_scope_names() {
        let globals = globals_of("int counter = 0;\ndouble total = 0.0;\nint f() { int local = 1; return local; }\n");
        assert_eq!(
            globals,
            BTreeSet::from(["counter".to_string(), "total".to_string()])
        );
    }

    #[test]
    fn test_multiple_declarators() {
        let globals = globals_of("int a, b = 2, c;\n");
        assert_eq!(globals.len(), 3);
        assert!(globals.contains("b"));
    }

    #[test]
    fn test_idempotent() {
        let sf = SourceFile::new("int x;\n");
        let tu = Parser::new(&sf).parse().unwrap();
        assert_eq!(collect_globals(&tu), collect_globals(&tu));
    }
}
