//! Diagnostic prologues, one per target kind.
//!
//! Both print a single line to `System.err` and then call
//! `Thread.dumpStack()`. The string pieces come from `diagnostics`, so the
//! runtime output matches `diagnostics::event_line`.

use haltwatch_classfile::{Assembler, ClassFile, ClassFileError, Fragment};

use crate::diagnostics::{event_description, ARGUMENT_SEPARATOR, THREAD_NAME_LABEL};
use crate::error::{AgentError, Result};
use crate::targets::TargetKind;

const SYSTEM: &str = "java/lang/System";
const PRINT_STREAM: &str = "java/io/PrintStream";
const PRINT_STREAM_DESC: &str = "Ljava/io/PrintStream;";
const STRING: &str = "java/lang/String";
const THREAD: &str = "java/lang/Thread";
const CONCAT_DESC: &str = "(Ljava/lang/String;)Ljava/lang/String;";
const JOIN_DESC: &str = "(Ljava/lang/CharSequence;Ljava/lang/Iterable;)Ljava/lang/String;";

/// Instance field of `ProcessBuilder` holding the command and its arguments.
pub const COMMAND_FIELD: &str = "command";
pub const COMMAND_FIELD_DESC: &str = "Ljava/util/List;";

/// Assemble the prologue for `method` of `class`, interning constants into
/// the class's own pool.
pub fn build(kind: TargetKind, class: &mut ClassFile, method: &str) -> Result<Fragment> {
    let class_name = class
        .name()
        .map_err(|e| AgentError::compilation("<unnamed>", method, e))?;
    if kind == TargetKind::ProcessStart
        && class
            .find_field(COMMAND_FIELD, COMMAND_FIELD_DESC)
            .is_none()
    {
        return Err(AgentError::compilation(
            &class_name,
            method,
            format!("no field {}:{}", COMMAND_FIELD, COMMAND_FIELD_DESC),
        ));
    }

    let mut asm = Assembler::new(&mut class.constant_pool);
    let assembled = match kind {
        TargetKind::Halt => halt(&mut asm),
        TargetKind::ProcessStart => process_start(&mut asm, &class_name),
    };
    assembled
        .and_then(|_| asm.finish())
        .map_err(|e| AgentError::compilation(&class_name, method, e))
}

// System.err.println("<desc>. Current thread name: ".concat(Thread.currentThread().getName()));
// Thread.dumpStack();
fn halt(asm: &mut Assembler<'_>) -> std::result::Result<(), ClassFileError> {
    asm.put_getstatic(SYSTEM, "err", PRINT_STREAM_DESC)?;
    let prefix = format!("{}{}", event_description(TargetKind::Halt), THREAD_NAME_LABEL);
    asm.put_ldc_string(&prefix)?;
    put_thread_name(asm)?;
    asm.put_invokevirtual(STRING, "concat", CONCAT_DESC)?;
    put_println_and_dump(asm)
}

// System.err.println("<desc>"
//     .concat(String.join(", ", this.command))
//     .concat(". Current thread name: ")
//     .concat(Thread.currentThread().getName()));
// Thread.dumpStack();
fn process_start(asm: &mut Assembler<'_>, owner: &str) -> std::result::Result<(), ClassFileError> {
    asm.put_getstatic(SYSTEM, "err", PRINT_STREAM_DESC)?;
    asm.put_ldc_string(event_description(TargetKind::ProcessStart))?;
    asm.put_ldc_string(ARGUMENT_SEPARATOR)?;
    asm.put_aload(0);
    asm.put_getfield(owner, COMMAND_FIELD, COMMAND_FIELD_DESC)?;
    asm.put_invokestatic(STRING, "join", JOIN_DESC)?;
    asm.put_invokevirtual(STRING, "concat", CONCAT_DESC)?;
    asm.put_ldc_string(THREAD_NAME_LABEL)?;
    asm.put_invokevirtual(STRING, "concat", CONCAT_DESC)?;
    put_thread_name(asm)?;
    asm.put_invokevirtual(STRING, "concat", CONCAT_DESC)?;
    put_println_and_dump(asm)
}

fn put_thread_name(asm: &mut Assembler<'_>) -> std::result::Result<(), ClassFileError> {
    asm.put_invokestatic(THREAD, "currentThread", "()Ljava/lang/Thread;")?;
    asm.put_invokevirtual(THREAD, "getName", "()Ljava/lang/String;")
}

fn put_println_and_dump(asm: &mut Assembler<'_>) -> std::result::Result<(), ClassFileError> {
    asm.put_invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V")?;
    asm.put_invokestatic(THREAD, "dumpStack", "()V")
}
