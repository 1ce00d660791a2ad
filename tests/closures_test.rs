//! Integration tests for closures and upvalues.

mod common;
use common::*;

macro_rules! assert_output {
    ($input:expr, $expected:expr) => {
        let result = run_program($input);
        assert!(
            result.is_ok(),
            "Failed to run '{}': {:?}",
            $input,
            result.err()
        );
        assert_eq!(
            result.unwrap(),
            $expected,
            "Output of '{}' did not match expected",
            $input
        );
    };
}

#[test]
fn test_closure_reads_enclosing_local() {
    assert_output!(
        "fun outer() { var x = \"captured\"; fun inner() { print x; } inner(); } outer();",
        "captured\n"
    );
}

#[test]
fn test_closure_writes_enclosing_local() {
    assert_output!(
        "fun outer() { var x = 1; fun bump() { x = x + 10; } bump(); print x; } outer();",
        "11\n"
    );
}

#[test]
fn test_closure_survives_enclosing_return() {
    assert_output!(
        "fun mk() { var x = \"alive\"; fun get() { return x; } return get; } \
         var g = mk(); print g();",
        "alive\n"
    );
}

#[test]
fn test_counter_increments_across_calls() {
    assert_output!(
        "fun mk() { var x = 0; fun inc() { x = x + 1; return x; } return inc; } \
         var c = mk(); print c(); print c(); print c();",
        "1\n2\n3\n"
    );
}

#[test]
fn test_independent_counters() {
    assert_output!(
        "fun mk() { var x = 0; fun inc() { x = x + 1; return x; } return inc; } \
         var a = mk(); var b = mk(); \
         print a(); print a(); print b();",
        "1\n2\n1\n"
    );
}

#[test]
fn test_siblings_share_the_same_variable() {
    assert_output!(
        "fun mk() { \
           var x = 0; \
           fun bump() { x = x + 1; } \
           fun read() { return x; } \
           bump(); bump(); bump(); \
           return read; \
         } \
         var r = mk(); print r();",
        "3\n"
    );
}

#[test]
fn test_capture_through_intermediate_function() {
    assert_output!(
        "fun a() { \
           var x = \"deep\"; \
           fun b() { fun c() { print x; } c(); } \
           b(); \
         } \
         a();",
        "deep\n"
    );
}

#[test]
fn test_loop_variable_is_shared_by_closures() {
    // There is one loop variable for the whole loop, so every closure sees
    // the same slot; it is closed once, after the loop, holding 3.
    assert_output!(
        "var first = nil; \
         for (var i = 0; i < 3; i = i + 1) { \
           fun get() { return i; } \
           if (first == nil) first = get; \
         } \
         print first();",
        "3\n"
    );
}

#[test]
fn test_block_exit_closes_upvalue() {
    assert_output!(
        "var get = nil; \
         { var x = \"boxed\"; fun g() { return x; } get = g; } \
         print get();",
        "boxed\n"
    );
}

#[test]
fn test_assignment_through_closed_upvalue() {
    assert_output!(
        "fun mk() { var x = 5; fun set(v) { x = v; } fun get() { return x; } \
           set(42); return get; } \
         print mk()();",
        "42\n"
    );
}

#[test]
fn test_method_closure_captures_this() {
    assert_output!(
        "class Box { \
           init(v) { this.v = v; } \
           getter() { fun g() { return this.v; } return g; } \
         } \
         var g = Box(9).getter(); print g();",
        "9\n"
    );
}

#[test]
fn test_returned_closure_keeps_parameters() {
    assert_output!(
        "fun adder(n) { fun add(m) { return n + m; } return add; } \
         var add2 = adder(2); print add2(40);",
        "42\n"
    );
}
