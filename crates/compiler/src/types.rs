//! C++ type classification for MPI transport
//!
//! Pure table lookups plus a small rulebook: map a C++ type spelling to
//! the MPI datatype used for sends/receives/broadcasts, produce a
//! default literal for result-slot initialization, and decide whether a
//! value of the type can be streamed to `std::cout` in the emitted
//! report section. Total functions; unsupported types degrade to
//! skipped MPI operations at emission time, never to errors.

/// Normalize C++ type spellings (`_Bool` → `bool`).
pub fn normalize(type_name: &str) -> &str {
    if type_name == "_Bool" {
        "bool"
    } else {
        type_name
    }
}

/// Exact-key table: (spelling, MPI datatype, default literal).
/// An empty MPI datatype marks a known-but-unsupported type.
const TYPE_TABLE: &[(&str, &str, &str)] = &[
    ("int", "MPI_INT", "0"),
    ("double", "MPI_DOUBLE", "0.0"),
    ("float", "MPI_FLOAT", "0.0f"),
    ("bool", "MPI_C_BOOL", "false"),
    ("char", "MPI_CHAR", "'\\0'"),
    ("long", "MPI_LONG", "0L"),
    ("unsigned int", "MPI_UNSIGNED", "0U"),
    ("long long", "MPI_LONG_LONG", "0LL"),
    ("std::string", "", "\"\""),
    ("auto", "", "0"),
];

fn table_entry(normalized: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    TYPE_TABLE.iter().find(|(key, _, _)| *key == normalized)
}

fn is_chrono_like(normalized: &str) -> bool {
    normalized.contains("std::chrono") || normalized.contains("__enable_if_is_duration")
}

/// The MPI datatype for a C++ type, or `None` when the type cannot be
/// moved over MPI with a single send.
pub fn mpi_type_of(type_name: &str) -> Option<&'static str> {
    let normalized = normalize(type_name);
    if let Some((_, mpi, _)) = table_entry(normalized) {
        return if mpi.is_empty() { None } else { Some(mpi) };
    }
    if is_chrono_like(normalized) || normalized.contains("::") {
        return None;
    }
    // Simple unrecognized scalars fall back to MPI_INT
    Some("MPI_INT")
}

/// A literal suitable for initializing a variable of the given type.
pub fn default_literal_of(type_name: &str) -> String {
    let normalized = normalize(type_name);
    if let Some((_, _, literal)) = table_entry(normalized) {
        return (*literal).to_string();
    }
    if is_chrono_like(normalized) {
        return "std::chrono::system_clock::time_point{}".to_string();
    }
    if normalized.contains("::") {
        return format!("{}{{}}", normalized);
    }
    "0".to_string()
}

/// Whether the type has a defined MPI datatype.
pub fn is_supported(type_name: &str) -> bool {
    mpi_type_of(type_name).is_some()
}

/// Whether a value of the type can be streamed to `std::cout` in the
/// emitted result dump. Basic scalars and `std::string` qualify.
pub fn is_printable(type_name: &str) -> bool {
    let normalized = normalize(type_name);
    if let Some((key, _, _)) = table_entry(normalized) {
        return *key == "std::string" || mpi_type_of(normalized).is_some();
    }
    if normalized.contains("std::string") {
        return true;
    }
    if normalized.contains("::") {
        return false;
    }
    // Unknown simple types are assumed streamable
    true
}
