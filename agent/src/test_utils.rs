//! Shared test utilities for the agent crate.
//!
//! Fixture classes are assembled with the classfile builder so tests do not
//! depend on a JDK being installed.

use std::collections::BTreeMap;
use std::sync::Arc;

use haltwatch_classfile::access::*;
use haltwatch_classfile::code::insn::Instructions;
use haltwatch_classfile::code::opcode::*;
use haltwatch_classfile::code::stackmap::{StackMapFrame, StackMapTable, VerificationType};
use haltwatch_classfile::code::ExceptionEntry;
use haltwatch_classfile::{AttributeInfo, ClassFile, CodeAttribute, Constant, ConstantPool};

use crate::diagnostics::{render_stack_trace, StackFrame};
use crate::error::AgentError;
use crate::host::{ClassFileHook, ClassLoadEvent, HostError, InstrumentationHost};
use crate::targets::ClassIdentity;

// ── Fixture classes ──────────────────────────────────────────────────

/// `java/lang/Shutdown` with `halt(I)V`, an overload `halt(J)V` and the
/// native `halt0(I)V`.
pub fn shutdown_class() -> Vec<u8> {
    shutdown(true)
}

/// Same class with the `halt(I)V` overload missing.
pub fn shutdown_class_without_halt() -> Vec<u8> {
    shutdown(false)
}

fn shutdown(with_halt: bool) -> Vec<u8> {
    let mut class = ClassFile::new("java/lang/Shutdown", "java/lang/Object", 52).unwrap();
    class.access_flags = ACC_FINAL | ACC_SUPER;
    let pool = &mut class.constant_pool;
    let [h0, h1] = pool
        .method_ref_index("java/lang/Shutdown", "halt0", "(I)V")
        .unwrap()
        .to_be_bytes();
    let throwable = pool.class_index("java/lang/Throwable").unwrap();
    let stack_map = pool.utf8_index("StackMapTable").unwrap();
    let line_numbers = pool.utf8_index("LineNumberTable").unwrap();

    if with_halt {
        // if (status == 0) halt0(1) else halt0(status), rethrowing anything
        let mut code = CodeAttribute::new(
            1,
            2,
            vec![
                ILOAD_0,              // 0
                IFEQ, 0x00, 0x08,     // 1 -> 9
                ILOAD_0,              // 4
                INVOKESTATIC, h0, h1, // 5
                RETURN,               // 8
                ICONST_1,             // 9
                INVOKESTATIC, h0, h1, // 10
                RETURN,               // 13
                ASTORE_1,             // 14
                ALOAD_1,              // 15
                ATHROW,               // 16
            ],
        );
        code.exception_table.push(ExceptionEntry {
            start_pc: 0,
            end_pc: 14,
            handler_pc: 14,
            catch_type: throwable,
        });
        let frames = StackMapTable {
            frames: vec![
                StackMapFrame::Same { offset_delta: 9 },
                StackMapFrame::SameLocals1StackItem {
                    offset_delta: 4,
                    stack: VerificationType::Object(throwable),
                },
            ],
        };
        code.attributes.push(AttributeInfo {
            name_index: stack_map,
            info: frames.to_bytes(),
        });
        code.attributes.push(AttributeInfo {
            name_index: line_numbers,
            info: vec![0, 2, 0, 0, 0, 170, 0, 9, 0, 172],
        });
        class
            .add_method(ACC_STATIC, "halt", "(I)V", Some(&code))
            .unwrap();
    }

    let overload = CodeAttribute::new(2, 2, vec![LLOAD_0, L2I, INVOKESTATIC, h0, h1, RETURN]);
    class
        .add_method(ACC_STATIC, "halt", "(J)V", Some(&overload))
        .unwrap();
    class
        .add_method(ACC_STATIC | ACC_NATIVE | ACC_PRIVATE, "halt0", "(I)V", None)
        .unwrap();
    class.to_bytes()
}

/// `java/lang/ProcessBuilder` with `start()` delegating to a private
/// `start(Redirect[])`. `with_command` controls the `command` field.
pub fn process_builder_class(with_command: bool) -> Vec<u8> {
    let mut class = ClassFile::new("java/lang/ProcessBuilder", "java/lang/Object", 52).unwrap();
    class.access_flags = ACC_PUBLIC | ACC_FINAL | ACC_SUPER;
    if with_command {
        class
            .add_field(ACC_PRIVATE, "command", "Ljava/util/List;")
            .unwrap();
    }
    let redirect_desc = "([Ljava/lang/ProcessBuilder$Redirect;)Ljava/lang/Process;";
    let pool = &mut class.constant_pool;
    let [r0, r1] = pool
        .class_index("java/lang/ProcessBuilder$Redirect")
        .unwrap()
        .to_be_bytes();
    let [s0, s1] = pool
        .method_ref_index("java/lang/ProcessBuilder", "start", redirect_desc)
        .unwrap()
        .to_be_bytes();

    let start = CodeAttribute::new(
        2,
        1,
        vec![
            ALOAD_0,
            ICONST_0,
            ANEWARRAY, r0, r1,
            INVOKESPECIAL, s0, s1,
            ARETURN,
        ],
    );
    class
        .add_method(ACC_PUBLIC, "start", "()Ljava/lang/Process;", Some(&start))
        .unwrap();
    let inner = CodeAttribute::new(1, 2, vec![ACONST_NULL, ARETURN]);
    class
        .add_method(ACC_PRIVATE, "start", redirect_desc, Some(&inner))
        .unwrap();
    class.to_bytes()
}

/// A class no target entry refers to.
pub fn plain_class(name: &str) -> Vec<u8> {
    let mut class = ClassFile::new(name, "java/lang/Object", 52).unwrap();
    class
        .add_method(ACC_PUBLIC, "run", "()V", Some(&CodeAttribute::new(0, 1, vec![RETURN])))
        .unwrap();
    class.to_bytes()
}

// ── In-memory host ───────────────────────────────────────────────────

/// Host that keeps loaded classes as bytes. Retransformation is atomic: if
/// any hook fails, no class is replaced.
#[derive(Default)]
pub struct FakeHost {
    classes: BTreeMap<String, Vec<u8>>,
    hooks: Vec<Arc<dyn ClassFileHook>>,
    rejection: Option<HostError>,
    pub retransform_requests: usize,
}

impl FakeHost {
    /// Both target classes already loaded, no hooks.
    pub fn with_targets() -> Self {
        let mut host = Self::default();
        host.preload("java/lang/Shutdown", shutdown_class());
        host.preload("java/lang/ProcessBuilder", process_builder_class(true));
        host
    }

    /// Register a class as loaded without running hooks.
    pub fn preload(&mut self, name: &str, bytes: Vec<u8>) {
        self.classes.insert(name.to_string(), bytes);
    }

    /// Make the next retransformation request fail with `error`.
    pub fn reject_with(&mut self, error: HostError) {
        self.rejection = Some(error);
    }

    pub fn bytes_of(&self, name: &str) -> Option<&[u8]> {
        self.classes.get(name).map(Vec::as_slice)
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Load a new class through the registered hooks.
    pub fn define(&mut self, name: &str, bytes: &[u8]) -> Result<(), AgentError> {
        let out = self.run_hooks(name, bytes, false)?;
        self.classes.insert(name.to_string(), out);
        Ok(())
    }

    fn run_hooks(&self, name: &str, bytes: &[u8], redefining: bool) -> Result<Vec<u8>, AgentError> {
        let mut current = bytes.to_vec();
        for hook in &self.hooks {
            let event = ClassLoadEvent {
                name: Some(name),
                loader: None,
                redefining,
                bytes: &current,
            };
            let next = hook.transform(&event)?.into_owned();
            current = next;
        }
        Ok(current)
    }
}

impl InstrumentationHost for FakeHost {
    type Class = String;

    fn add_class_hook(&mut self, hook: Arc<dyn ClassFileHook>) {
        self.hooks.push(hook);
    }

    fn remove_class_hook(&mut self, hook: &Arc<dyn ClassFileHook>) {
        self.hooks.retain(|h| !Arc::ptr_eq(h, hook));
    }

    fn resolve_class(&self, class: &ClassIdentity) -> Option<String> {
        self.classes
            .contains_key(class.internal_name())
            .then(|| class.internal_name().to_string())
    }

    fn retransform_classes(&mut self, classes: &[String]) -> Result<(), HostError> {
        self.retransform_requests += 1;
        if let Some(error) = self.rejection.take() {
            return Err(error);
        }
        let mut staged = Vec::with_capacity(classes.len());
        for name in classes {
            let bytes = self
                .classes
                .get(name)
                .ok_or_else(|| HostError::Rejected(format!("{} is not loaded", name)))?;
            staged.push((name.clone(), self.run_hooks(name, bytes, true)?));
        }
        self.classes.extend(staged);
        Ok(())
    }
}

// ── Prologue replay ──────────────────────────────────────────────────

/// What the diagnostic code can observe at run time.
pub struct ReplayEnv<'a> {
    pub thread_name: &'a str,
    pub command: &'a [String],
    pub stack: &'a [StackFrame],
}

#[derive(Debug)]
pub struct Replay {
    /// Text the prologue writes to standard error.
    pub output: String,
    pub lines: usize,
    pub dumps: usize,
    /// Offset just past the `Thread.dumpStack()` call.
    pub resume_pc: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    PrintStream,
    Receiver,
    Thread,
    Str(String),
    List(Vec<String>),
}

fn pop_str(stack: &mut Vec<Value>) -> String {
    match stack.pop() {
        Some(Value::Str(s)) => s,
        other => panic!("expected a string on the stack, found {:?}", other),
    }
}

fn string_constant(pool: &ConstantPool, index: u16) -> String {
    match pool.get(index).unwrap() {
        Constant::String { string_index } => pool.utf8(*string_index).unwrap(),
        other => panic!("ldc of non-string constant {:?}", other),
    }
}

/// Execute the injected prologue of a method up to and including its
/// `Thread.dumpStack()` call, modelling just the library calls it makes.
/// Panics on any instruction a diagnostic prologue should not contain.
pub fn replay_prologue(class_bytes: &[u8], name: &str, descriptor: &str, env: &ReplayEnv<'_>) -> Replay {
    let class = ClassFile::parse(class_bytes).unwrap();
    let index = class.find_method(name, descriptor).unwrap();
    let code = class.method_code(index).unwrap().unwrap().code;
    let pool = &class.constant_pool;

    let mut stack = Vec::new();
    let mut replay = Replay {
        output: String::new(),
        lines: 0,
        dumps: 0,
        resume_pc: 0,
    };
    for insn in Instructions::new(&code) {
        let insn = insn.unwrap();
        let operand = || u16::from_be_bytes([code[insn.pc + 1], code[insn.pc + 2]]);
        match insn.opcode {
            NOP => {}
            ALOAD_0 => stack.push(Value::Receiver),
            LDC => stack.push(Value::Str(string_constant(pool, code[insn.pc + 1] as u16))),
            LDC_W => stack.push(Value::Str(string_constant(pool, operand()))),
            GETSTATIC => {
                let (owner, field, _) = pool.member_ref(operand()).unwrap();
                assert_eq!((owner.as_str(), field.as_str()), ("java/lang/System", "err"));
                stack.push(Value::PrintStream);
            }
            GETFIELD => {
                let (_, field, _) = pool.member_ref(operand()).unwrap();
                assert_eq!(field, "command");
                assert_eq!(stack.pop(), Some(Value::Receiver));
                stack.push(Value::List(env.command.to_vec()));
            }
            INVOKESTATIC | INVOKEVIRTUAL => {
                let (owner, method, _) = pool.member_ref(operand()).unwrap();
                match (owner.as_str(), method.as_str()) {
                    ("java/lang/Thread", "currentThread") => stack.push(Value::Thread),
                    ("java/lang/Thread", "getName") => {
                        assert_eq!(stack.pop(), Some(Value::Thread));
                        stack.push(Value::Str(env.thread_name.to_string()));
                    }
                    ("java/lang/String", "concat") => {
                        let tail = pop_str(&mut stack);
                        let head = pop_str(&mut stack);
                        stack.push(Value::Str(head + &tail));
                    }
                    ("java/lang/String", "join") => {
                        let Some(Value::List(items)) = stack.pop() else {
                            panic!("String.join without a list");
                        };
                        let separator = pop_str(&mut stack);
                        stack.push(Value::Str(items.join(&separator)));
                    }
                    ("java/io/PrintStream", "println") => {
                        let line = pop_str(&mut stack);
                        assert_eq!(stack.pop(), Some(Value::PrintStream));
                        replay.output.push_str(&line);
                        replay.output.push('\n');
                        replay.lines += 1;
                    }
                    ("java/lang/Thread", "dumpStack") => {
                        replay.output.push_str(&render_stack_trace(env.stack));
                        replay.dumps += 1;
                        replay.resume_pc = insn.pc + insn.len;
                        assert!(stack.is_empty(), "prologue left {:?} on the stack", stack);
                        return replay;
                    }
                    other => panic!("unexpected call {:?} in prologue", other),
                }
            }
            op => panic!("opcode {:#04x} at {} is not part of a prologue", op, insn.pc),
        }
    }
    replay
}
