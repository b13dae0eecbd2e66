//! Known-function catalogs
//!
//! The closed deny-list that separates user functions from C standard
//! library, C++ idiom, and runtime-support names, plus the smaller
//! catalogs the loop analyzer keys on (I/O routines, thread-unsafe
//! routines, math routines, stream sentinels).

use std::collections::BTreeSet;
use std::sync::LazyLock;

/// C stdlib and C++ idiom names that are never user functions.
static STANDARD_FUNCTIONS: LazyLock<BTreeSet<&'static str>> = LazyLock::new(|| {
    BTreeSet::from([
        // stdio.h
        "printf", "scanf", "fprintf", "fscanf", "sprintf", "sscanf",
        "fopen", "fclose", "fread", "fwrite", "fgetc", "fputc", "fgets", "fputs",
        "getchar", "putchar", "gets", "puts", "perror", "fflush", "fseek", "ftell",
        // stdlib.h
        "malloc", "calloc", "realloc", "free", "exit", "abort", "atexit",
        "system", "getenv", "setenv", "rand", "srand", "rand_r", "abs", "labs", "div", "ldiv",
        "atoi", "atol", "atof", "strtol", "strtod", "qsort", "bsearch",
        // string.h
        "strlen", "strcpy", "strncpy", "strcat", "strncat", "strcmp", "strncmp",
        "strchr", "strrchr", "strstr", "strspn", "strcspn", "strpbrk", "strtok",
        "memcpy", "memmove", "memcmp", "memchr", "memset",
        // math.h
        "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "sinh", "cosh", "tanh",
        "exp", "log", "log10", "pow", "sqrt", "ceil", "floor", "fabs", "fmod",
        "frexp", "ldexp", "modf",
        // time.h
        "time", "clock", "difftime", "mktime", "strftime", "localtime", "gmtime",
        "asctime", "ctime", "sleep", "usleep",
        // unistd.h and friends
        "read", "write", "close", "lseek", "access", "unlink", "getpid", "fork",
        "exec", "execl", "execv", "execve", "wait", "waitpid",
        "open", "creat", "dup", "dup2", "pipe", "chdir", "getcwd", "mkdir", "rmdir",
        // C++ standard library idioms
        "now", "count", "size", "begin", "end", "data", "empty", "clear",
        "push_back", "pop_back", "insert", "erase", "find", "reserve", "resize",
        "at", "front", "back", "emplace", "emplace_back", "shrink_to_fit",
        "sort", "min", "max", "swap", "to_string", "stoi", "stod",
    ])
});

/// Stream objects that are never treated as ordinary variables.
pub const STREAM_SENTINELS: &[&str] = &["cout", "cin", "cerr", "clog", "endl"];

/// Direct calls that mark a loop as performing I/O.
pub const IO_FUNCTIONS: &[&str] = &[
    "printf", "scanf", "puts", "gets", "fprintf", "fscanf", "fread", "fwrite",
];

/// Direct calls that are not thread-safe under OpenMP.
pub const UNSAFE_FUNCTIONS: &[&str] = &[
    "rand", "srand", "strtok", "asctime", "ctime", "gmtime", "localtime", "strerror",
];

/// Math routines: counted as function calls but never block
/// parallelization on their own.
pub const MATH_FUNCTIONS: &[&str] = &["sin", "cos", "exp", "sqrt", "pow", "log"];

/// Decide whether a callee name denotes a user-defined function.
///
/// `extra_denied` extends the built-in deny-list (loaded from the user's
/// TOML config).
pub fn is_user_function(name: &str, extra_denied: &BTreeSet<String>) -> bool {
    if name.is_empty() {
        return false;
    }
    if STANDARD_FUNCTIONS.contains(name) || extra_denied.contains(name) {
        return false;
    }
    // Runtime-support namespaces of the emitted program; filtering them
    // keeps re-running the transformer on its own output a no-op.
    if name.starts_with("MPI_") || name.starts_with("omp_") {
        return false;
    }
    if name.starts_with("__") {
        return false;
    }
    if name.contains("::") || name.contains('<') || name.contains('>') {
        return false;
    }
    if name.contains("operator") {
        return false;
    }
    if STREAM_SENTINELS.contains(&name) || name.contains("cout") || name.contains("cin")
        || name.contains("endl")
    {
        return false;
    }
    true
}

pub fn is_stream_sentinel(name: &str) -> bool {
    STREAM_SENTINELS.contains(&name)
}

pub fn is_io_function(name: &str) -> bool {
    IO_FUNCTIONS.contains(&name)
}

pub fn is_unsafe_function(name: &str) -> bool {
    UNSAFE_FUNCTIONS.contains(&name)
}

pub fn is_math_function(name: &str) -> bool {
    MATH_FUNCTIONS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_extra() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[test]
    fn test_stdlib_names_rejected() {
        for name in ["printf", "malloc", "memcpy", "strlen", "sin", "time", "sort", "push_back"] {
            assert!(!is_user_function(name, &no_extra()), "{} should be denied", name);
        }
    }

    #[test]
    fn test_user_names_accepted() {
        for name in ["compute_sum", "update_counter", "simulate", "f", "g"] {
            assert!(is_user_function(name, &no_extra()), "{} should be a user function", name);
        }
    }

    #[test]
    fn test_internal_and_templated_rejected() {
        assert!(!is_user_function("__builtin_expect", &no_extra()));
        assert!(!is_user_function("std::sort", &no_extra()));
        assert!(!is_user_function("get<0>", &no_extra()));
        assert!(!is_user_function("operator<<", &no_extra()));
    }

    #[test]
    fn test_runtime_support_rejected() {
        assert!(!is_user_function("MPI_Send", &no_extra()));
        assert!(!is_user_function("MPI_Init_thread", &no_extra()));
        assert!(!is_user_function("omp_get_thread_num", &no_extra()));
        assert!(!is_user_function("rand_r", &no_extra()));
    }

    #[test]
    fn test_extra_deny_list() {
        let extra = BTreeSet::from(["my_runtime_helper".to_string()]);
        assert!(!is_user_function("my_runtime_helper", &extra));
        assert!(is_user_function("my_runtime_helper", &no_extra()));
    }

    #[test]
    fn test_loop_catalogs() {
        assert!(is_io_function("printf"));
        assert!(!is_io_function("sin"));
        assert!(is_unsafe_function("rand"));
        assert!(is_unsafe_function("strtok"));
        assert!(is_math_function("sqrt"));
        assert!(is_stream_sentinel("cout"));
    }
}
