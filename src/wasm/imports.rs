//! Host imports: the four functions a ChocoPy guest links against.
//!
//! Every function reaches guest memory through the store's [`HostState`],
//! never through process-wide state. A guest that defines its own memory
//! instead of importing one is served through its `memory` export.

use std::io::Write;

use serde::Deserialize;
use tracing::{debug, warn};
use wasmtime::{Caller, Extern, ExternType, Linker, Memory, Module};

use super::error::{HostError, HostResult};
use super::memory::read_length_prefixed;
use super::output::OutputSink;

/// What a failing `assert` call does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertMode {
    /// Trap the guest. No further guest output.
    #[default]
    Halt,
    /// Log a warning and keep running.
    Warn,
}

impl std::str::FromStr for AssertMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halt" => Ok(Self::Halt),
            "warn" => Ok(Self::Warn),
            other => Err(format!("unknown assert mode '{other}' (expected halt or warn)")),
        }
    }
}

/// Namespace and field names the guest imports from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportNames {
    /// Module name of `logString`, `logInt`, `logBool` and `assert`.
    pub functions: String,
    pub memory_module: String,
    pub memory_name: String,
}

impl Default for ImportNames {
    fn default() -> Self {
        Self {
            functions: "imports".into(),
            memory_module: "js".into(),
            memory_name: "mem".into(),
        }
    }
}

/// Counts of host calls made during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCallStats {
    pub strings: u64,
    pub ints: u64,
    pub bools: u64,
    pub asserts: u64,
    /// Failed assertions tolerated in [`AssertMode::Warn`].
    pub assert_warnings: u64,
}

/// Store data for a guest run.
pub struct HostState {
    memory: Option<Memory>,
    out: OutputSink,
    assert_mode: AssertMode,
    stats: HostCallStats,
}

impl HostState {
    pub fn new(out: OutputSink, assert_mode: AssertMode) -> Self {
        Self {
            memory: None,
            out,
            assert_mode,
            stats: HostCallStats::default(),
        }
    }

    /// Hand the host-created memory to the imports.
    pub fn set_memory(&mut self, memory: Memory) {
        self.memory = Some(memory);
    }

    pub fn stats(&self) -> HostCallStats {
        self.stats
    }

    fn emit(&mut self, line: impl std::fmt::Display) -> HostResult<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(())
    }

    fn check(&mut self, condition: i32, line: Option<i32>) -> HostResult<()> {
        self.stats.asserts += 1;
        if condition != 0 {
            return Ok(());
        }
        match self.assert_mode {
            AssertMode::Halt => Err(HostError::AssertionFailed { line }),
            AssertMode::Warn => {
                self.stats.assert_warnings += 1;
                match line {
                    Some(line) => warn!(line, "guest assertion failed"),
                    None => warn!("guest assertion failed"),
                }
                Ok(())
            }
        }
    }
}

/// Parameter count of the guest's `assert` import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertArity {
    /// `assert(condition)`
    Condition,
    /// `assert(condition, line)`
    ConditionAndLine,
}

impl AssertArity {
    /// Read the arity from the module's declared import type.
    ///
    /// Defaults to the one-parameter form when the import is absent.
    pub fn of_module(module: &Module, names: &ImportNames) -> Self {
        module
            .imports()
            .find(|imp| imp.module() == names.functions && imp.name() == "assert")
            .and_then(|imp| match imp.ty() {
                ExternType::Func(ty) if ty.params().len() == 2 => Some(Self::ConditionAndLine),
                _ => None,
            })
            .unwrap_or(Self::Condition)
    }
}

/// Memory the imports should read: the host-created one, else the guest's export.
fn guest_memory(caller: &mut Caller<'_, HostState>) -> HostResult<Memory> {
    if let Some(memory) = caller.data().memory {
        return Ok(memory);
    }
    match caller.get_export("memory") {
        Some(Extern::Memory(memory)) => Ok(memory),
        _ => Err(HostError::NoMemory),
    }
}

fn log_string(mut caller: Caller<'_, HostState>, offset: i32) -> wasmtime::Result<()> {
    let memory = guest_memory(&mut caller)?;
    let (data, state) = memory.data_and_store_mut(&mut caller);
    let text = read_length_prefixed(data, offset as u32)?;
    state.stats.strings += 1;
    state.emit(text)?;
    Ok(())
}

fn log_int(mut caller: Caller<'_, HostState>, value: i64) -> wasmtime::Result<()> {
    let state = caller.data_mut();
    state.stats.ints += 1;
    state.emit(value)?;
    Ok(())
}

fn log_bool(mut caller: Caller<'_, HostState>, value: i32) -> wasmtime::Result<()> {
    let state = caller.data_mut();
    state.stats.bools += 1;
    state.emit(value != 0)?;
    Ok(())
}

fn assert_condition(mut caller: Caller<'_, HostState>, condition: i32) -> wasmtime::Result<()> {
    caller.data_mut().check(condition, None)?;
    Ok(())
}

fn assert_with_line(
    mut caller: Caller<'_, HostState>,
    condition: i32,
    line: i32,
) -> wasmtime::Result<()> {
    caller.data_mut().check(condition, Some(line))?;
    Ok(())
}

/// Register the logging functions (and the matching `assert`) on a linker.
pub fn add_to_linker(
    linker: &mut Linker<HostState>,
    names: &ImportNames,
    arity: AssertArity,
) -> HostResult<()> {
    let ns = names.functions.as_str();
    let link_err = |name: &str, e: wasmtime::Error| HostError::Link(format!("{ns}.{name}: {e}"));

    linker
        .func_wrap(ns, "logString", log_string)
        .map_err(|e| link_err("logString", e))?;
    linker
        .func_wrap(ns, "logInt", log_int)
        .map_err(|e| link_err("logInt", e))?;
    linker
        .func_wrap(ns, "logBool", log_bool)
        .map_err(|e| link_err("logBool", e))?;
    let registered = match arity {
        AssertArity::Condition => linker.func_wrap(ns, "assert", assert_condition),
        AssertArity::ConditionAndLine => linker.func_wrap(ns, "assert", assert_with_line),
    };
    registered.map_err(|e| link_err("assert", e))?;

    debug!(namespace = ns, ?arity, "host imports registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wasm::output::SharedBuffer;

    fn state(mode: AssertMode) -> (SharedBuffer, HostState) {
        let buf = SharedBuffer::new();
        let state = HostState::new(buf.sink(), mode);
        (buf, state)
    }

    #[test]
    fn assert_mode_from_str() {
        assert_eq!("halt".parse::<AssertMode>().unwrap(), AssertMode::Halt);
        assert_eq!("warn".parse::<AssertMode>().unwrap(), AssertMode::Warn);
        assert!("ignore".parse::<AssertMode>().is_err());
    }

    #[test]
    fn default_import_names() {
        let names = ImportNames::default();
        assert_eq!(names.functions, "imports");
        assert_eq!(names.memory_module, "js");
        assert_eq!(names.memory_name, "mem");
    }

    #[test]
    fn passing_assertion_counts_but_does_not_fail() {
        let (_buf, mut state) = state(AssertMode::Halt);
        assert!(state.check(1, None).is_ok());
        assert_eq!(state.stats().asserts, 1);
        assert_eq!(state.stats().assert_warnings, 0);
    }

    #[test]
    fn halt_mode_fails_with_line() {
        let (_buf, mut state) = state(AssertMode::Halt);
        match state.check(0, Some(7)).unwrap_err() {
            HostError::AssertionFailed { line } => assert_eq!(line, Some(7)),
            other => panic!("expected AssertionFailed, got: {other}"),
        }
    }

    #[test]
    fn warn_mode_continues() {
        let (buf, mut state) = state(AssertMode::Warn);
        assert!(state.check(0, None).is_ok());
        assert_eq!(state.stats().assert_warnings, 1);
        // Warnings go through tracing, not the guest sink.
        assert!(buf.contents().is_empty());
    }

    #[test]
    fn emit_writes_lines() {
        let (buf, mut state) = state(AssertMode::Halt);
        state.emit(42).unwrap();
        state.emit(false).unwrap();
        assert_eq!(buf.lines(), vec!["42", "false"]);
    }

    #[test]
    fn arity_detected_from_import_type() {
        let engine = wasmtime::Engine::default();
        let names = ImportNames::default();

        let one = Module::new(
            &engine,
            r#"(module (import "imports" "assert" (func (param i32))))"#,
        )
        .unwrap();
        assert_eq!(AssertArity::of_module(&one, &names), AssertArity::Condition);

        let two = Module::new(
            &engine,
            r#"(module (import "imports" "assert" (func (param i32 i32))))"#,
        )
        .unwrap();
        assert_eq!(
            AssertArity::of_module(&two, &names),
            AssertArity::ConditionAndLine
        );

        let none = Module::new(&engine, "(module)").unwrap();
        assert_eq!(AssertArity::of_module(&none, &names), AssertArity::Condition);
    }
}
