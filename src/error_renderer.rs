//! Error rendering using ariadne
//!
//! Bytecode keeps no source spans, so reports carry the message, a short
//! error code and notes about where the error came from (module file,
//! faulting fiber) instead of annotated snippets.

use crate::{Error, VmError};
use ariadne::{Report, ReportKind, Source};
use std::io::Write;

/// Render an error with formatting to stderr
///
/// # Example
/// ```no_run
/// use fibril::{AstBuilder, BytecodeCompiler, Globals, Type, render_error};
/// use bumpalo::Bump;
///
/// let arena = Bump::new();
/// let b = AstBuilder::new(&arena);
/// let module = b.module("m", &[b.func("main", Type::Void, &[], &[b.eval(b.call("nope", &[]))])]);
///
/// if let Err(e) = BytecodeCompiler::compile(&Globals::with_builtins(), &module) {
///     render_error(&e.into());
/// }
/// ```
pub fn render_error(error: &Error) {
    render_error_to_writer(error, &mut std::io::stderr(), true).ok();
}

/// Render an error to a specific writer
pub fn render_error_to(error: &Error, writer: &mut dyn Write) -> std::io::Result<()> {
    render_error_to_writer(error, writer, true)
}

/// Render an error to a String (useful for logs and in-game consoles)
pub fn render_error_to_string(error: &Error) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, &mut buf, true).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// Render an error to a String without color codes (useful for tests)
pub fn render_error_to_string_no_color(error: &Error) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// What a report says about one error.
struct Summary {
    source_id: String,
    code: &'static str,
    message: String,
    notes: Vec<String>,
    help: Option<&'static str>,
}

fn summarize(error: &Error) -> Summary {
    match error {
        Error::Compile(err) => Summary {
            source_id: err
                .file
                .as_ref()
                .map_or_else(|| "<module>".to_string(), |file| file.to_string()),
            code: "compile",
            message: err.kind.to_string(),
            notes: Vec::new(),
            help: None,
        },
        Error::Runtime(err) => {
            let mut notes = Vec::new();
            if let VmError::Fiber { id, .. } = err {
                notes.push(format!("raised by fiber {id:?}, which was stopped"));
            }
            Summary {
                source_id: "<vm>".to_string(),
                code: "runtime",
                message: err.root().to_string(),
                notes,
                help: runtime_help(err.root()),
            }
        }
        Error::Bind(err) => Summary {
            source_id: "<globals>".to_string(),
            code: "bind",
            message: err.to_string(),
            notes: Vec::new(),
            help: None,
        },
    }
}

fn runtime_help(fault: &VmError) -> Option<&'static str> {
    match fault {
        VmError::DeferSuspended => Some("`defer` bodies must not call `yield`, `suspend` or other coroutines"),
        VmError::CallDepthExceeded { .. } => Some("raise `VmOptions::max_call_depth` if the recursion is intended"),
        VmError::StackOverflow { .. } => Some("raise `VmOptions::max_stack_size` if the script needs a deeper stack"),
        _ => None,
    }
}

fn render_error_to_writer(
    error: &Error,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    let summary = summarize(error);
    let id = summary.source_id.as_str();

    let mut report = Report::build(ReportKind::Error, (id, 0..0))
        .with_code(summary.code)
        .with_message(&summary.message)
        .with_config(ariadne::Config::default().with_color(use_color));
    for note in &summary.notes {
        report = report.with_note(note);
    }
    if let Some(help) = summary.help {
        report = report.with_help(help);
    }

    report.finish().write((id, Source::from("")), &mut *writer)
}
