//! Guest runtime: loads a module, links the host imports, instantiates it.
//!
//! A ChocoPy guest does all its work in its start function, so a run is just
//! instantiation: Loading (memory + imports) → Running (start executes,
//! calling back into the imports) → Exited. One Store per run.

use std::path::Path;

use tracing::{debug, info, info_span};
use wasmtime::{Engine, ExternType, Linker, Memory, Module, Store};

use super::error::{HostError, HostResult};
use super::imports::{add_to_linker, AssertArity, HostCallStats, HostState, ImportNames};
use super::output::OutputSink;
use crate::config::HostConfig;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Running,
    Exited,
}

/// A compiled guest module.
#[derive(Clone)]
pub struct GuestModule {
    module: Module,
    name: String,
}

impl std::fmt::Debug for GuestModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestModule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl GuestModule {
    /// Display name: the source path, or `<bytes>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Whether the guest expects the host to supply its linear memory.
    pub fn imports_memory(&self, names: &ImportNames) -> bool {
        self.module.imports().any(|imp| {
            imp.module() == names.memory_module
                && imp.name() == names.memory_name
                && matches!(imp.ty(), ExternType::Memory(_))
        })
    }
}

/// Outcome of a run that exited normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub stats: HostCallStats,
    /// True when the host created the memory (guest imported it).
    pub host_memory: bool,
}

/// The host runtime: engine plus resolved configuration.
///
/// Cheap to clone; the engine is reference-counted.
#[derive(Clone)]
pub struct HostRuntime {
    engine: Engine,
    config: HostConfig,
}

impl HostRuntime {
    /// Validate the configuration and create the engine.
    pub fn new(config: HostConfig) -> HostResult<Self> {
        config.validate()?;
        let engine = Engine::new(&wasmtime::Config::new())
            .map_err(|e| HostError::EngineCreation(e.to_string()))?;
        Ok(Self { engine, config })
    }

    /// Compile a module from binary `.wasm` or `.wat` text.
    pub fn load_module(&self, bytes: &[u8]) -> HostResult<GuestModule> {
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| HostError::Compilation(format!("{e:#}")))?;
        Ok(GuestModule {
            module,
            name: "<bytes>".into(),
        })
    }

    /// Read and compile a module from a filesystem path.
    pub fn load_module_from_path(&self, path: &Path) -> HostResult<GuestModule> {
        let bytes = std::fs::read(path).map_err(|source| HostError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let module = Module::new(&self.engine, &bytes)
            .map_err(|e| HostError::Compilation(format!("{}: {e:#}", path.display())))?;
        debug!(path = %path.display(), size = bytes.len(), "module compiled");
        Ok(GuestModule {
            module,
            name: path.display().to_string(),
        })
    }

    /// Link and instantiate the guest, writing its output to `out`.
    ///
    /// Returns once the start function has finished. Any failure is fatal
    /// for the run; output already written stays written.
    pub fn run(&self, guest: &GuestModule, out: OutputSink) -> HostResult<RunReport> {
        let span = info_span!("guest", module = %guest.name());
        let _enter = span.enter();
        let names = &self.config.imports;

        debug!(phase = ?Phase::Loading);
        let mut store = Store::new(&self.engine, HostState::new(out, self.config.assert_mode));
        let mut linker = Linker::new(&self.engine);

        let host_memory = guest.imports_memory(names);
        if host_memory {
            let memory = Memory::new(&mut store, self.config.memory.memory_type())
                .map_err(|e| HostError::Memory(format!("{e:#}")))?;
            linker
                .define(&store, &names.memory_module, &names.memory_name, memory)
                .map_err(|e| HostError::Link(format!("{e:#}")))?;
            store.data_mut().set_memory(memory);
            debug!(
                initial_pages = self.config.memory.initial_pages,
                maximum_pages = self.config.memory.maximum_pages,
                "host memory created"
            );
        }

        add_to_linker(&mut linker, names, AssertArity::of_module(guest.module(), names))?;
        let pre = linker
            .instantiate_pre(guest.module())
            .map_err(|e| HostError::Link(format!("{e:#}")))?;

        debug!(phase = ?Phase::Running);
        pre.instantiate(&mut store).map_err(guest_failure)?;

        debug!(phase = ?Phase::Exited);
        let stats = store.data().stats();
        info!(
            strings = stats.strings,
            ints = stats.ints,
            bools = stats.bools,
            asserts = stats.asserts,
            assert_warnings = stats.assert_warnings,
            "guest exited"
        );
        Ok(RunReport { stats, host_memory })
    }

    /// Run on a blocking worker and await completion.
    pub async fn run_async(
        &self,
        guest: GuestModule,
        out: OutputSink,
    ) -> HostResult<RunReport> {
        let runtime = self.clone();
        tokio::task::spawn_blocking(move || runtime.run(&guest, out))
            .await
            .map_err(|e| HostError::Instantiation(format!("guest task panicked: {e}")))?
    }
}

/// Surface host-raised errors as themselves, everything else as a trap.
fn guest_failure(err: wasmtime::Error) -> HostError {
    match err.downcast::<HostError>() {
        Ok(host) => host,
        Err(err) if err.downcast_ref::<wasmtime::Trap>().is_some() => {
            HostError::Trap(format!("{err:#}"))
        }
        Err(err) => HostError::Instantiation(format!("{err:#}")),
    }
}
