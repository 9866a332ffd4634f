//! FileCheck-style test validation for TIR files.
//!
//! A test file is ordinary TIR with `; RUN:` lines naming the printer flags
//! to run the pipeline with and `; CHECK` lines describing the expected
//! output, in the manner of LLVM's FileCheck.

use super::parse_ir;
use super::printer::{render, PrintOptions};
use crate::core::session::CompilationSession;
use crate::pipeline::{compile_function, PipelineOptions};

/// A CHECK directive extracted from a TIR file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on this or any later line
    Check(String),
    /// CHECK-LABEL: pattern - Start of a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not appear before the next match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

/// Test specification extracted from a TIR file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub tir_content: String,
}

const PREFIXES: [&str; 5] = [
    "; CHECK-LABEL:",
    "; CHECK-NEXT:",
    "; CHECK-NOT:",
    "; CHECK:",
    "; COM:",
];

impl TestSpec {
    /// Split a TIR file into directives and IR text. Directive lines are kept
    /// in the IR as blank lines so parse errors report the original line.
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut tir_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let parts: Vec<&str> = run_cmd.split_whitespace().collect();
                let Some((command, args)) = parts.split_first() else {
                    return Err("empty RUN directive".to_string());
                };
                run_directives.push(RunDirective {
                    command: command.to_string(),
                    args: args.iter().map(|s| s.to_string()).collect(),
                });
                tir_lines.push("");
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
                tir_lines.push("");
            } else if let Some((prefix, pattern)) = PREFIXES
                .iter()
                .find_map(|p| trimmed.strip_prefix(p).map(|rest| (*p, rest.trim().to_string())))
            {
                let directive = match prefix {
                    "; CHECK-LABEL:" => CheckDirective::CheckLabel(pattern),
                    "; CHECK-NEXT:" => CheckDirective::CheckNext(pattern),
                    "; CHECK-NOT:" => CheckDirective::CheckNot(pattern),
                    "; CHECK:" => CheckDirective::Check(pattern),
                    _ => CheckDirective::Comment(pattern),
                };
                check_directives.push(directive);
                tir_lines.push("");
            } else {
                tir_lines.push(line);
            }
        }

        if run_directives.is_empty() {
            return Err("no RUN directive".to_string());
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            tir_content: tir_lines.join("\n"),
        })
    }
}

/// Test runner that executes TIR tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run a TIR test and validate output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        for run_dir in &spec.run_directives {
            let output = self.execute_command(&spec.tir_content, run_dir)?;
            if self.verbose {
                println!("{}", output);
            }
            self.validate_output(&output, &spec.check_directives)?;
        }
        Ok(())
    }

    /// Run the pipeline over `tir` and return the printed output. Compile
    /// errors become part of the output so tests can check for them.
    fn execute_command(&self, tir: &str, run_dir: &RunDirective) -> Result<String, String> {
        let mut print = PrintOptions::default();
        let mut options = PipelineOptions::default();
        let mut only = None;

        let mut args = run_dir.args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "%s" => {}
                "--no-prefer-callee-saved" => options.allocator.prefer_callee_saved = false,
                "--strict-layout" => options.strict_layout = true,
                "--max-spill-slots" => {
                    let value = args
                        .next()
                        .and_then(|v| v.parse().ok())
                        .ok_or("--max-spill-slots needs a number")?;
                    options.allocator.max_spill_slots = Some(value);
                }
                "--function" => {
                    only = Some(args.next().ok_or("--function needs a name")?.as_str());
                }
                flag => {
                    if !print.enable(flag) {
                        return Err(format!("unknown RUN argument '{}'", flag));
                    }
                }
            }
        }

        let funcs = match parse_ir(tir) {
            Ok(funcs) => funcs,
            Err(e) => return Ok(format!("error: {}", e)),
        };

        let session = CompilationSession::new();
        let mut output = String::new();
        for func in &funcs {
            if only.is_some_and(|name| name != func.name()) {
                continue;
            }
            let result = compile_function(&session, func, &options)
                .and_then(|compiled| render(func, &compiled, &print));
            match result {
                Ok(text) => output.push_str(&text),
                Err(e) => output.push_str(&format!("error: {}: {}\n", func.name(), e)),
            }
        }
        Ok(output)
    }

    /// Validate output against CHECK directives
    pub fn validate_output(
        &self,
        output: &str,
        directives: &[CheckDirective],
    ) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern.as_str()),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    match found {
                        Some(idx) => {
                            check_not(&pending_not, &output_lines[line_idx..line_idx + idx])?;
                            pending_not.clear();
                            line_idx += idx + 1;
                            if self.verbose {
                                println!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                            }
                        }
                        None => {
                            return Err(format!(
                                "CHECK: pattern '{}' not found in output",
                                pattern
                            ));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = output_lines[line_idx];
                    if !line.contains(pattern.as_str()) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        ));
                    }

                    if self.verbose {
                        println!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = output_lines[line_idx];
                    if !line.trim().is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    line_idx += 1;
                }
            }
        }

        check_not(&pending_not, &output_lines[line_idx.min(output_lines.len())..])
    }
}

fn check_not(patterns: &[&str], lines: &[&str]) -> Result<(), String> {
    for pattern in patterns {
        if let Some(line) = lines.iter().find(|line| line.contains(pattern)) {
            return Err(format!("CHECK-NOT: '{}' found in '{}'", pattern, line));
        }
    }
    Ok(())
}
