//! Integration tests for arithmetic, comparison, equality, and printing.

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

macro_rules! assert_runtime_err {
    ($input:expr, $message:expr) => {
        match run_program($input) {
            Err(SkiffError::Runtime(err)) => assert_eq!(err.message, $message),
            other => panic!("expected runtime error for '{}', got {:?}", $input, other),
        }
    };
}

#[test]
fn test_number_formatting() {
    assert_output!("print 7;", "7\n");
    assert_output!("print 3.25;", "3.25\n");
    assert_output!("print 0.5;", "0.5\n");
    assert_output!("print -0.0;", "-0\n");
    assert_output!("print 1000000;", "1000000\n");
}

#[test]
fn test_addition_and_subtraction() {
    assert_output!("print 1 + 2;", "3\n");
    assert_output!("print 10 - 4 - 3;", "3\n");
    assert_output!("print 0.1 + 0.2 > 0.3;", "true\n");
}

#[test]
fn test_multiplication_binds_tighter() {
    assert_output!("print 2 + 3 * 4;", "14\n");
    assert_output!("print (2 + 3) * 4;", "20\n");
    assert_output!("print 12 / 3 / 2;", "2\n");
}

#[test]
fn test_unary_minus() {
    assert_output!("print -5;", "-5\n");
    assert_output!("print --5;", "5\n");
    assert_output!("print -5 + 10;", "5\n");
}

#[test]
fn test_bang_negates_truthiness() {
    assert_output!("print !true;", "false\n");
    assert_output!("print !nil;", "true\n");
    assert_output!("print !!\"text\";", "true\n");
}

#[test]
fn test_division_follows_ieee() {
    assert_output!("print 1 / 0;", "inf\n");
    assert_output!("print -1 / 0;", "-inf\n");
    assert_output!("print 0 / 0 == 0 / 0;", "false\n");
}

#[test]
fn test_comparisons() {
    assert_output!("print 1 < 2;", "true\n");
    assert_output!("print 2 <= 2;", "true\n");
    assert_output!("print 2 > 2;", "false\n");
    assert_output!("print 3 >= 2;", "true\n");
}

#[test]
fn test_equality_on_numbers_and_bools() {
    assert_output!("print 1 == 1;", "true\n");
    assert_output!("print 1 != 2;", "true\n");
    assert_output!("print true == true;", "true\n");
    assert_output!("print true == false;", "false\n");
}

#[test]
fn test_equality_across_variants_is_false() {
    assert_output!("print nil == false;", "false\n");
    assert_output!("print 0 == false;", "false\n");
    assert_output!("print \"1\" == 1;", "false\n");
}

#[test]
fn test_string_equality_is_by_content() {
    assert_output!("print \"abc\" == \"abc\";", "true\n");
    assert_output!("print \"abc\" == \"abd\";", "false\n");
    assert_output!("print \"ab\" + \"c\" == \"abc\";", "true\n");
}

#[test]
fn test_string_concatenation_chains() {
    assert_output!("print \"a\" + \"b\" + \"c\";", "abc\n");
    assert_output!("var s = \"\"; s = s + \"x\"; s = s + \"y\"; print s;", "xy\n");
}

#[test]
fn test_comparison_has_lower_precedence_than_term() {
    assert_output!("print 1 + 2 < 4;", "true\n");
    assert_output!("print 1 + 2 == 3;", "true\n");
}

#[test]
fn test_grouping_overrides_precedence() {
    assert_output!("print !(1 == 2);", "true\n");
}

#[test]
fn test_add_type_errors() {
    assert_runtime_err!(
        "print 1 + \"x\";",
        "operands to '+' must be two numbers or two strings"
    );
    assert_runtime_err!(
        "print nil + nil;",
        "operands to '+' must be two numbers or two strings"
    );
}

#[test]
fn test_arithmetic_type_errors() {
    assert_runtime_err!("print \"a\" - \"b\";", "operands to '-' must be numbers");
    assert_runtime_err!("print true * 2;", "operands to '*' must be numbers");
    assert_runtime_err!("print nil / 2;", "operands to '/' must be numbers");
}

#[test]
fn test_comparison_type_errors() {
    assert_runtime_err!("print \"a\" < \"b\";", "operands to '<' must be numbers");
    assert_runtime_err!("print 1 > nil;", "operands to '>' must be numbers");
}

#[test]
fn test_negate_type_error() {
    assert_runtime_err!("print -nil;", "operand to '-' must be a number, got nil");
}

#[test]
fn test_print_literals() {
    assert_output!("print nil;", "nil\n");
    assert_output!("print true;", "true\n");
    assert_output!("print false;", "false\n");
    assert_output!("print \"with spaces\";", "with spaces\n");
    assert_output!("print \"\";", "\n");
}

#[test]
fn test_operand_errors_precede_side_effects() {
    // The faulting statement produces no output before the error lands.
    let err = expect_runtime_error("print 1; print 1 + nil; print 2;");
    assert_eq!(
        err.message,
        "operands to '+' must be two numbers or two strings"
    );
    let output = run_program("print 1;").unwrap();
    assert_eq!(output, "1\n");
}
