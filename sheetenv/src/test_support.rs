//! Test-only helpers: scripted connectors, fault-injecting engines and
//! ready-made environments.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde_json::Value;

use crate::core::address::{CellAddr, RangeAddr};
use crate::core::command::FormatOptions;
use crate::core::types::{Action, CellValue};
use crate::episode::SpreadsheetEnv;
use crate::io::config::{EnvConfig, ExportConfig};
use crate::io::engine::{Connector, Document, DocumentFormat, Engine, EngineError, EngineResult};
use crate::io::memory::{MemoryEngine, Workbook};

/// Config with no connection backoff so retry tests run instantly.
pub fn fast_config() -> EnvConfig {
    let mut cfg = EnvConfig::default();
    cfg.connect.backoff_ms = 0;
    cfg
}

/// An in-memory environment that has already been reset.
pub fn ready_env() -> SpreadsheetEnv {
    let mut env = SpreadsheetEnv::in_memory(fast_config());
    let obs = env.reset();
    assert!(obs.success, "reset failed: {:?}", obs.error_message);
    env
}

/// Build an action from a command name and a JSON object of parameters.
pub fn action(command: &str, parameters: Value) -> Action {
    let mut action = Action::new(command);
    if let Value::Object(map) = parameters {
        action.parameters = map;
    }
    action
}

/// Connector that fails a fixed number of times before handing out engines.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    failures_left: u32,
    broken: bool,
    faulty_teardown: bool,
    attempts: Arc<AtomicU32>,
    terminated: Arc<AtomicBool>,
}

impl ScriptedConnector {
    /// Fails with a retryable connect error `failures` times, then succeeds.
    pub fn failing(failures: u32) -> Self {
        Self {
            failures_left: failures,
            ..Self::default()
        }
    }

    /// Fails every attempt with a non-retryable error.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// Engines whose document close and terminate both fail.
    pub fn with_faulty_teardown(mut self) -> Self {
        self.faulty_teardown = true;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Shared attempt counter that outlives the connector once it is boxed.
    pub fn attempt_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.attempts)
    }

    /// Set once `terminate` has been called on an engine from this connector.
    pub fn terminated_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.terminated)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&mut self) -> EngineResult<Box<dyn Engine>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(EngineError::Failed("engine binary missing".to_string()));
        }
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(EngineError::Connect("connection refused".to_string()));
        }
        Ok(Box::new(ScriptedEngine {
            inner: MemoryEngine::new(ExportConfig::default()),
            faulty_teardown: self.faulty_teardown,
            terminated: Arc::clone(&self.terminated),
        }))
    }
}

struct ScriptedEngine {
    inner: MemoryEngine,
    faulty_teardown: bool,
    terminated: Arc<AtomicBool>,
}

impl Engine for ScriptedEngine {
    fn new_document(&mut self) -> EngineResult<Box<dyn Document>> {
        let inner = self.inner.new_document()?;
        Ok(Box::new(ScriptedDocument {
            inner,
            faulty_close: self.faulty_teardown,
        }))
    }

    fn load_document(&mut self, path: &Path) -> EngineResult<Box<dyn Document>> {
        let inner = self.inner.load_document(path)?;
        Ok(Box::new(ScriptedDocument {
            inner,
            faulty_close: self.faulty_teardown,
        }))
    }

    fn terminate(&mut self) -> EngineResult<()> {
        self.terminated.store(true, Ordering::SeqCst);
        self.inner.terminate()?;
        if self.faulty_teardown {
            return Err(EngineError::Failed("engine did not exit".to_string()));
        }
        Ok(())
    }
}

/// Delegates to the in-memory document; `close` can be made to fail.
struct ScriptedDocument {
    inner: Box<dyn Document>,
    faulty_close: bool,
}

impl Document for ScriptedDocument {
    fn sheet_names(&self) -> Vec<String> {
        self.inner.sheet_names()
    }

    fn insert_sheet(&mut self, name: &str, index: usize) -> EngineResult<()> {
        self.inner.insert_sheet(name, index)
    }

    fn remove_sheet(&mut self, name: &str) -> EngineResult<()> {
        self.inner.remove_sheet(name)
    }

    fn rename_sheet(&mut self, old_name: &str, new_name: &str) -> EngineResult<()> {
        self.inner.rename_sheet(old_name, new_name)
    }

    fn cell_text(&self, sheet: &str, cell: CellAddr) -> EngineResult<String> {
        self.inner.cell_text(sheet, cell)
    }

    fn cell_value(&self, sheet: &str, cell: CellAddr) -> EngineResult<f64> {
        self.inner.cell_value(sheet, cell)
    }

    fn cell_formula(&self, sheet: &str, cell: CellAddr) -> EngineResult<String> {
        self.inner.cell_formula(sheet, cell)
    }

    fn set_cell_value(&mut self, sheet: &str, cell: CellAddr, value: f64) -> EngineResult<()> {
        self.inner.set_cell_value(sheet, cell, value)
    }

    fn set_cell_text(&mut self, sheet: &str, cell: CellAddr, text: &str) -> EngineResult<()> {
        self.inner.set_cell_text(sheet, cell, text)
    }

    fn set_cell_formula(&mut self, sheet: &str, cell: CellAddr, formula: &str) -> EngineResult<()> {
        self.inner.set_cell_formula(sheet, cell, formula)
    }

    fn range_values(&self, sheet: &str, range: RangeAddr) -> EngineResult<Vec<Vec<CellValue>>> {
        self.inner.range_values(sheet, range)
    }

    fn apply_format(&mut self, sheet: &str, range: RangeAddr, format: &FormatOptions) -> EngineResult<()> {
        self.inner.apply_format(sheet, range, format)
    }

    fn store(&mut self, path: &Path, format: DocumentFormat, sheet: &str) -> EngineResult<()> {
        self.inner.store(path, format, sheet)
    }

    fn close(&mut self) -> EngineResult<()> {
        self.inner.close()?;
        if self.faulty_close {
            return Err(EngineError::Failed("document refused to close".to_string()));
        }
        Ok(())
    }
}

/// Write a native workbook at `path` whose first sheet is `sheet` with `A1 = text`.
pub fn write_base_document(path: &Path, sheet: &str, text: &str) {
    let mut book = Workbook::new(ExportConfig::default());
    book.rename_sheet("Sheet1", sheet).expect("rename sheet");
    book.set_cell_text(sheet, CellAddr::new(0, 0), text)
        .expect("write cell");
    book.store(path, DocumentFormat::Native, sheet)
        .expect("store base document");
}
