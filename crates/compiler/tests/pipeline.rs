//! End-to-end pipeline tests over complete translation units.

use hybridc::{DependencyReason, TransformConfig, transform_source};

fn transform(src: &str) -> hybridc::TransformOutput {
    transform_source(src, &TransformConfig::default()).expect("transform failed")
}

// ----------------------------------------------------------------------
// Scenario: reduction loop
// ----------------------------------------------------------------------

#[test]
fn reduction_loop_gets_reduction_pragma() {
    let output = transform(
        "double sum_squares(int n) {\n    double s = 0;\n    for (int i = 1; i <= n; i++) s += i * i;\n    return s;\n}\nint main() {\n    double total = sum_squares(1000);\n    return 0;\n}\n",
    );
    let f = &output.analysis.functions[0];
    assert_eq!(f.name, "sum_squares");
    let l = &f.loops[0];
    assert!(l.parallelizable);
    assert_eq!(l.reductions.get("s").map(|op| op.symbol()), Some("+"));
    assert_eq!(
        l.pragma_text,
        "#pragma omp parallel for reduction(+:s) schedule(static)"
    );
    assert!(output
        .code
        .contains("#pragma omp parallel for reduction(+:s) schedule(static)"));
}

// ----------------------------------------------------------------------
// Scenario: loop-carried dependence
// ----------------------------------------------------------------------

#[test]
fn loop_carried_dependence_rejected() {
    let output = transform(
        "int a[100];\nvoid smooth(int n) {\n    for (int i = 1; i < n; i++) a[i] = a[i - 1] + 1;\n}\nint main() {\n    smooth(100);\n    return 0;\n}\n",
    );
    let l = &output.analysis.functions[0].loops[0];
    assert!(l.has_loop_carried_dep);
    assert!(l.reductions.is_empty());
    assert!(!l.parallelizable);
    assert!(l.notes.contains("Has loop-carried dependencies"));
    assert!(!output.code.contains("#pragma omp parallel for"));
}

// ----------------------------------------------------------------------
// Scenario: independent calls
// ----------------------------------------------------------------------

#[test]
fn independent_calls_form_one_parallel_group() {
    let output = transform(
        "int f() { return 1; }\nint g() { return 2; }\nint main() {\n    int x = f();\n    int y = g();\n    return 0;\n}\n",
    );
    assert_eq!(output.analysis.plan.groups, vec![vec![0, 1]]);
    assert!(output.analysis.plan.edges.is_empty());
    assert!(output.code.contains("int assigned_rank_0 = 0 % effective_processes;"));
    assert!(output.code.contains("int assigned_rank_1 = 1 % effective_processes;"));
    // Rank 0 receives the remotely computed result
    assert!(output.code.contains("if (assigned_rank_1 != 0) {"));
    assert!(output.code.contains(
        "MPI_Recv(&result_1, 1, MPI_INT, assigned_rank_1, 1, MPI_COMM_WORLD, MPI_STATUS_IGNORE);"
    ));
}

// ----------------------------------------------------------------------
// Scenario: global read-after-write
// ----------------------------------------------------------------------

#[test]
fn global_raw_forces_sequential_groups() {
    let output = transform(
        "int counter = 0;\nvoid update_counter() { counter = counter + 1; }\nint read_counter() { return counter; }\nint main() {\n    update_counter();\n    int r = read_counter();\n    return 0;\n}\n",
    );
    assert_eq!(output.analysis.plan.groups, vec![vec![0], vec![1]]);
    let edge = &output.analysis.plan.edges[0];
    assert_eq!((edge.from, edge.to), (0, 1));
    assert!(edge
        .reasons
        .contains(&DependencyReason::GlobalRaw("counter".to_string())));
}

// ----------------------------------------------------------------------
// Scenario: complex condition excused by reduction
// ----------------------------------------------------------------------

#[test]
fn complex_condition_with_reduction_is_parallelizable() {
    let output = transform(
        "double bounded_sum(int n) {\n    double s = 0;\n    for (int i = 0; i < n && s < 1000.0; i++) s += i * 0.5;\n    return s;\n}\nint main() {\n    double r = bounded_sum(100);\n    return 0;\n}\n",
    );
    let l = &output.analysis.functions[0].loops[0];
    assert!(l.has_complex_condition);
    assert!(!l.reductions.is_empty());
    assert!(l.parallelizable);
}

// ----------------------------------------------------------------------
// Scenario: reserved-name collision
// ----------------------------------------------------------------------

#[test]
fn local_named_rank_is_renamed_consistently() {
    let output = transform(
        "int scale(int a) { return a * 2; }\nint main() {\n    int rank = 3;\n    int x = scale(rank);\n    return 0;\n}\n",
    );
    let main_start = output.code.find("int main(").unwrap();
    let emitted_main = &output.code[main_start..];
    assert!(emitted_main.contains("int user_rank = 3;"));
    assert!(emitted_main.contains("scale(user_rank)"));
    assert!(!emitted_main.contains("scale(rank)"));
    // MPI's own rank declaration survives
    assert!(emitted_main.contains("int rank, size, provided;"));
}

// ----------------------------------------------------------------------
// Quantified invariants
// ----------------------------------------------------------------------

#[test]
fn bound_locals_are_declared_before_all_groups() {
    let output = transform(
        "int f() { return 1; }\nint g(int a) { return a; }\nint main() {\n    int x = f();\n    int y = g(x);\n    return 0;\n}\n",
    );
    let decl_x = output.code.find("int x = ").or(output.code.find("int x;")).unwrap();
    let first_group = output.code.find("// === Parallel group 0 ===").unwrap();
    assert!(decl_x < first_group);
}

#[test]
fn dependency_edges_are_forward_and_acyclic() {
    let output = transform(
        "int shared = 0;\nvoid a() { shared = 1; }\nvoid b() { shared = 2; }\nvoid c() { shared = 3; }\nint main() {\n    a();\n    b();\n    c();\n    return 0;\n}\n",
    );
    for edge in &output.analysis.plan.edges {
        assert!(edge.from < edge.to);
        assert!(!edge.reasons.is_empty());
    }
}

#[test]
fn no_group_contains_a_dependent_pair() {
    let output = transform(
        "int counter = 0;\nint f() { return counter; }\nvoid w() { counter = 5; }\nint h() { return 9; }\nint main() {\n    int x = f();\n    w();\n    int z = h();\n    return 0;\n}\n",
    );
    let plan = &output.analysis.plan;
    for group in &plan.groups {
        for edge in &plan.edges {
            assert!(!(group.contains(&edge.from) && group.contains(&edge.to)));
        }
    }
    // Every call appears in exactly one group
    let total: usize = plan.groups.iter().map(|g| g.len()).sum();
    assert_eq!(total, output.analysis.main.calls.len());
}

#[test]
fn pragmas_have_one_schedule_and_reductions_when_present() {
    let output = transform(
        "double f(int n) {\n    double s = 0;\n    for (int i = 0; i < n; i++) s += i;\n    return s;\n}\nvoid g(int n) {\n    for (int i = 0; i < n; i++) { helper(i); }\n}\nvoid helper(int i) { }\nint main() {\n    double x = f(10);\n    g(10);\n    return 0;\n}\n",
    );
    for f in &output.analysis.functions {
        for l in &f.loops {
            if l.parallelizable {
                assert_eq!(l.pragma_text.matches("schedule(").count(), 1);
                if !l.reductions.is_empty() {
                    assert!(l.pragma_text.contains("reduction("));
                }
            }
        }
    }
}

#[test]
fn thread_seed_declared_exactly_once_per_function() {
    let output = transform(
        "double noise(int n) {\n    double s = 0;\n    for (int i = 0; i < n; i++) s += rand();\n    for (int i = 0; i < n; i++) s += rand() * 0.5;\n    return s;\n}\nint main() {\n    double x = noise(100);\n    return 0;\n}\n",
    );
    assert_eq!(
        output
            .code
            .matches("unsigned int __thread_seed = (unsigned int)time(NULL) ^ omp_get_thread_num();")
            .count(),
        1
    );
    assert!(output.code.contains("rand_r(&__thread_seed)"));
    assert!(!output.code.contains("rand()"));
}

#[test]
fn emission_is_byte_deterministic() {
    let src = "int counter = 0;\ndouble total_sum = 0.0;\nvoid w() { counter = 1; }\nint r() { return counter; }\ndouble s(int n) {\n    double acc = 0;\n    for (int i = 0; i < n; i++) acc += i;\n    return acc;\n}\nint main() {\n    w();\n    int a = r();\n    double b = s(a);\n    return 0;\n}\n";
    let first = transform(src);
    let second = transform(src);
    assert_eq!(first.code, second.code);
}

// ----------------------------------------------------------------------
// Round-trip laws
// ----------------------------------------------------------------------

#[test]
fn rerunning_on_own_output_is_structurally_stable() {
    let src = "int counter = 0;\nvoid update_counter() { counter = counter + 1; }\nint read_counter() { return counter; }\ndouble sum_squares(int n) {\n    double s = 0;\n    for (int i = 1; i <= n; i++) s += i * i;\n    return s;\n}\nint main() {\n    update_counter();\n    int r = read_counter();\n    double q = sum_squares(100);\n    return 0;\n}\n";
    let first = transform(src);
    let second = transform(&first.code);

    // Groups and edges between the original user calls are preserved
    assert_eq!(
        first.analysis.plan.groups.len(),
        second.analysis.plan.groups.len()
    );
    assert_eq!(
        first.analysis.plan.edges.len(),
        second.analysis.plan.edges.len()
    );

    // The parallelizable-loop set is unchanged and pragmas are not
    // duplicated
    let count_parallel = |output: &hybridc::TransformOutput| {
        output
            .analysis
            .functions
            .iter()
            .flat_map(|f| &f.loops)
            .filter(|l| l.parallelizable)
            .count()
    };
    assert_eq!(count_parallel(&first), count_parallel(&second));
    assert_eq!(
        first.code.matches("#pragma omp parallel for").count(),
        second.code.matches("#pragma omp parallel for").count()
    );
}

#[test]
fn no_user_calls_yields_single_barrier_region() {
    let src = "int main() {\n    int x = 5;\n    return 0;\n}\n";
    let first = transform(src);
    assert!(first.analysis.plan.groups.is_empty());
    assert!(first
        .code
        .contains("// No user function calls detected in main"));
    assert_eq!(first.code.matches("MPI_Barrier(MPI_COMM_WORLD);").count(), 1);
    let second = transform(src);
    assert_eq!(first.code, second.code);
}

// ----------------------------------------------------------------------
// Error handling
// ----------------------------------------------------------------------

#[test]
fn missing_definition_becomes_stub() {
    let output = transform(
        "int main() {\n    simulate();\n    return 0;\n}\n",
    );
    assert!(output
        .code
        .contains("// Function definition not found for: simulate"));
    assert!(output.code.contains("printf(\"Executing simulate\\n\");"));
}

#[test]
fn unsupported_return_type_degrades_to_comment() {
    let output = transform(
        "std::string label() { return \"x\"; }\nint width() { return 3; }\nint main() {\n    std::string s = label();\n    int w = width();\n    return 0;\n}\n",
    );
    assert!(output
        .code
        .contains("// Skipping MPI_Send for unsupported type: std::string"));
    assert!(output
        .code
        .contains("// Skipping MPI_Bcast for unsupported type: std::string"));
    // The supported sibling still travels over MPI
    assert!(output.code.contains("MPI_Bcast(&w, 1, MPI_INT, 0, MPI_COMM_WORLD);"));
}

#[test]
fn unreadable_statements_degrade_without_failing() {
    let output = transform(
        "void odd() {\n    @ $ !;\n    int n = 3;\n}\nint main() {\n    odd();\n    return 0;\n}\n",
    );
    assert!(output.code.contains("// Parallelized function: odd"));
}

// ----------------------------------------------------------------------
// CLI-facing configuration
// ----------------------------------------------------------------------

#[test]
fn no_loops_config_disables_pragmas_only() {
    let src = "double f(int n) {\n    double s = 0;\n    for (int i = 0; i < n; i++) s += i;\n    return s;\n}\nint g() { return 1; }\nint main() {\n    double x = f(10);\n    int y = g();\n    return 0;\n}\n";
    let config = TransformConfig::new().with_loop_parallelization(false);
    let output = transform_source(src, &config).unwrap();
    assert!(!output.code.contains("#pragma omp parallel for"));
    // MPI grouping still happens
    assert!(output.code.contains("int effective_processes = std::min(size, (int)2);"));
}

#[test]
fn extra_known_functions_are_not_scheduled() {
    let src = "int trace_begin() { return 0; }\nint f() { return 1; }\nint main() {\n    trace_begin();\n    int x = f();\n    return 0;\n}\n";
    let config = TransformConfig::new().with_known_function("trace_begin");
    let output = transform_source(src, &config).unwrap();
    let callees: Vec<&str> = output
        .analysis
        .main
        .calls
        .iter()
        .map(|c| c.callee_name.as_str())
        .collect();
    assert_eq!(callees, vec!["f"]);
}
