use std::path::Path;
use std::process::Command;
use std::process::Output;

use pretty_assertions::assert_eq;
use rstest::rstest;

fn pebble(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pebble"))
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> &str {
    std::str::from_utf8(&output.stdout).unwrap()
}

fn stderr(output: &Output) -> &str {
    std::str::from_utf8(&output.stderr).unwrap()
}

#[test]
fn version_flag_prints_the_version() {
    let output = pebble(&["--version"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), concat!("Pebble ", env!("CARGO_PKG_VERSION"), "\n"));
}

#[test]
fn copyright_flag_prints_the_copyright_line() {
    let output = pebble(&["-c"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "Pebble - Copyright (c) 2026 The Pebble developers\n");
}

#[test]
fn help_flag_prints_usage() {
    let output = pebble(&["-h"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Usage"));
}

#[rstest]
#[case::version_before_copyright(&["--version", "--copyright"], concat!("Pebble ", env!("CARGO_PKG_VERSION"), "\n"))]
#[case::copyright_before_version(&["--copyright", "--version"], "Pebble - Copyright (c) 2026 The Pebble developers\n")]
#[case::version_after_program(&["-e", "puts 1", "--version"], concat!("Pebble ", env!("CARGO_PKG_VERSION"), "\n"))]
fn first_informational_flag_wins(#[case] args: &[&str], #[case] expected: &str) {
    let output = pebble(args);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), expected);
}

#[rstest]
#[case::arithmetic("puts 1 + 1", "2\n")]
#[case::string_concat(r#"puts "peb" + "ble""#, "pebble\n")]
#[case::nil_prints_nothing("puts nil", "\n")]
#[case::comparison("puts 2 < 3", "true\n")]
#[case::variables("x = 3\ny = x * x\nputs y", "9\n")]
#[case::if_else("if 1 > 2\nputs \"big\"\nelse\nputs \"small\"\nend", "small\n")]
#[case::elsif("x = 2\nif x == 1\nputs \"one\"\nelsif x == 2\nputs \"two\"\nelse\nputs \"many\"\nend", "two\n")]
#[case::while_loop("i = 3\nwhile i > 0\nputs i\ni = i - 1\nend", "3\n2\n1\n")]
#[case::logical_or("puts nil || \"fallback\"", "fallback\n")]
#[case::logical_and("puts false && 1", "false\n")]
#[case::semicolons("puts 1; puts 2", "1\n2\n")]
#[case::comments("puts 1 # trailing comment", "1\n")]
#[case::expression_statement_is_silent("1 + 1", "")]
fn evaluate_runs_inline_source(#[case] source: &str, #[case] expected: &str) {
    let output = pebble(&["-e", source]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), expected);
    assert_eq!(stderr(&output), "");
}

#[rstest]
#[case::stray_end("end")]
#[case::unterminated_string(r#"puts "oops"#)]
#[case::missing_end("if true\nputs 1")]
#[case::undefined_variable("puts x")]
fn compile_errors_exit_nonzero(#[case] source: &str) {
    let output = pebble(&["-e", source]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "");
    assert!(!stderr(&output).is_empty());
}

#[test]
fn runtime_errors_do_not_affect_the_exit_status() {
    let output = pebble(&["-e", "puts nil + 1"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stderr(&output).contains("runtime error"));
}

#[test]
fn strict_mode_maps_runtime_errors_to_exit_status_one() {
    let output = pebble(&["--strict", "-e", "puts nil + 1"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn no_program_is_an_error() {
    let output = pebble(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("no program"));
}

#[test]
fn missing_file_is_an_error() {
    let output = pebble(&["does_not_exist.pbl"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "");
    assert!(stderr(&output).contains("does_not_exist.pbl"));
}

#[test]
fn unknown_option_is_an_error() {
    let output = pebble(&["--frobnicate"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn terminal_flag_wins_over_a_later_unknown_option() {
    let output = pebble(&["--version", "--frobnicate"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), concat!("Pebble ", env!("CARGO_PKG_VERSION"), "\n"));
}

#[test]
fn unknown_option_wins_over_a_later_terminal_flag() {
    let output = pebble(&["--frobnicate", "--version"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "");
}

#[test]
fn uppercase_loglevel_is_rejected() {
    let output = pebble(&["-l", "ERROR", "-e", "puts 1"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn evaluate_wins_over_a_program_file() {
    let program = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/programs/countdown.pbl");
    let output = pebble(&["-l", "warn", "-e", "puts 5", program.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "5\n");
    assert!(stderr(&output).contains("ignoring"));
}

#[test]
fn verbose_disassembly_goes_to_stderr() {
    let output = pebble(&["-V", "-e", "puts 1"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "1\n");
    assert!(stderr(&output).contains("disassembly"));
    assert!(stderr(&output).contains("print"));
}

#[test]
fn debug_loglevel_traces_the_pipeline() {
    let output = pebble(&["-l", "debug", "-e", "puts 1"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "1\n");
    assert!(stderr(&output).contains("pebble: [debug]"));
}

#[rstest]
#[case::countdown("countdown.pbl", "3\n2\n1\nliftoff\n")]
#[case::grades("grades.pbl", "B\n")]
#[case::fizzbuzz("fizzbuzz.pbl", "1\n2\nfizz\n4\nbuzz\nfizz\n7\n")]
fn runs_program_files(#[case] name: &str, #[case] expected: &str) {
    let program = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/programs").join(name);
    let output = pebble(&[program.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stderr(&output), "");
    assert_eq!(stdout(&output), expected);
}

#[test]
fn repeated_runs_are_identical() {
    let first = pebble(&["-e", "puts 1 + 1"]);
    let second = pebble(&["-e", "puts 1 + 1"]);
    assert_eq!(stdout(&first), stdout(&second));
    assert_eq!(first.status.code(), second.status.code());
}
