//! Layout of the diagnostic output.
//!
//! The injected bytecode builds its line from the same constants used here,
//! so `event_line` is exactly what a rewritten method prints.

use std::fmt;
use std::io::{self, Write};

use crate::targets::TargetKind;

pub const THREAD_NAME_LABEL: &str = ". Current thread name: ";
pub const ARGUMENT_SEPARATOR: &str = ", ";
/// First line printed by `Thread.dumpStack()`.
pub const STACK_TRACE_HEADER: &str = "java.lang.Exception: Stack trace";

pub fn event_description(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Halt => "Shutdown agent detected Shutdown.halt() call",
        TargetKind::ProcessStart => {
            "Agent detected process creation by ProcessBuilder.start() method. \
             Commands passed to the builder: "
        }
    }
}

/// `"<description>. Current thread name: <thread>"`. For process starts the
/// arguments are joined in order right after the description.
pub fn event_line(kind: TargetKind, thread_name: &str, arguments: Option<&[String]>) -> String {
    let mut line = String::from(event_description(kind));
    if let (TargetKind::ProcessStart, Some(args)) = (kind, arguments) {
        line.push_str(&args.join(ARGUMENT_SEPARATOR));
    }
    line.push_str(THREAD_NAME_LABEL);
    line.push_str(thread_name);
    line
}

/// One captured frame, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Binary (dotted) class name.
    pub class: String,
    pub method: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn new(class: &str, method: &str, file: Option<&str>, line: Option<u32>) -> Self {
        Self {
            class: class.replace('/', "."),
            method: method.to_string(),
            file: file.map(str::to_string),
            line,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\tat {}.{}(", self.class, self.method)?;
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{})", file, line),
            (Some(file), None) => write!(f, "{})", file),
            (None, _) => f.write_str("Unknown Source)"),
        }
    }
}

pub fn render_stack_trace(stack: &[StackFrame]) -> String {
    let mut out = String::with_capacity(64 + stack.len() * 48);
    out.push_str(STACK_TRACE_HEADER);
    out.push('\n');
    for frame in stack {
        out.push_str(&frame.to_string());
        out.push('\n');
    }
    out
}

/// Event line plus stack dump, as one block of text.
pub fn render(
    kind: TargetKind,
    thread_name: &str,
    arguments: Option<&[String]>,
    stack: &[StackFrame],
) -> String {
    let mut out = event_line(kind, thread_name, arguments);
    out.push('\n');
    out.push_str(&render_stack_trace(stack));
    out
}

/// Write one diagnostic to `out`. Write failures are ignored: diagnostics
/// must never change the outcome of the operation they describe.
pub fn emit<W: Write>(
    out: &mut W,
    kind: TargetKind,
    thread_name: &str,
    arguments: Option<&[String]>,
    stack: &[StackFrame],
) {
    let text = render(kind, thread_name, arguments, stack);
    let _ = out.write_all(text.as_bytes());
    let _ = out.flush();
}

pub fn emit_stderr(
    kind: TargetKind,
    thread_name: &str,
    arguments: Option<&[String]>,
    stack: &[StackFrame],
) {
    let stderr = io::stderr();
    emit(&mut stderr.lock(), kind, thread_name, arguments, stack);
}
