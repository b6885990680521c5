//! The live engine connection plus the episode's view of the document.

use std::path::{Path, PathBuf};

use crate::core::address;
use crate::io::engine::{Document, Engine, EngineResult};

/// One engine connection with exactly one open document and a current sheet.
pub struct DocumentHandle {
    engine: Box<dyn Engine>,
    document: Box<dyn Document>,
    current_sheet: String,
    file_path: Option<PathBuf>,
}

impl DocumentHandle {
    /// Take ownership of a connected engine and open a blank document.
    pub fn open(mut engine: Box<dyn Engine>) -> EngineResult<Self> {
        let document = engine.new_document()?;
        let current_sheet = first_sheet(document.as_ref());
        Ok(Self {
            engine,
            document,
            current_sheet,
            file_path: None,
        })
    }

    pub fn document(&self) -> &dyn Document {
        self.document.as_ref()
    }

    pub fn document_mut(&mut self) -> &mut dyn Document {
        self.document.as_mut()
    }

    pub fn current_sheet(&self) -> &str {
        &self.current_sheet
    }

    pub fn set_current_sheet(&mut self, name: impl Into<String>) {
        self.current_sheet = name.into();
    }

    /// Path the document was loaded from or last saved to.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn set_file_path(&mut self, path: impl Into<PathBuf>) {
        self.file_path = Some(path.into());
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.document.sheet_names()
    }

    /// Sheet a command targets: an existing requested sheet, else the current one.
    pub fn resolve_sheet(&self, requested: Option<&str>) -> String {
        let names = self.document.sheet_names();
        address::resolve_sheet(requested, &names, &self.current_sheet).to_string()
    }

    /// Load `path` and make it the active document. The previous document is
    /// closed only after the new one loaded, so a failed load leaves it intact.
    pub fn replace_document(&mut self, path: &Path) -> EngineResult<Option<String>> {
        let document = self.engine.load_document(path)?;
        let mut previous = std::mem::replace(&mut self.document, document);
        self.current_sheet = first_sheet(self.document.as_ref());
        self.file_path = Some(path.to_path_buf());
        Ok(previous.close().err().map(|err| err.to_string()))
    }

    pub fn close_document(&mut self) -> EngineResult<()> {
        self.document.close()
    }

    pub fn terminate(&mut self) -> EngineResult<()> {
        self.engine.terminate()
    }
}

fn first_sheet(document: &dyn Document) -> String {
    document.sheet_names().into_iter().next().unwrap_or_default()
}
