//! Episode state machine: reset, step and close over one live document.
//!
//! Phases:
//!
//! - `Uninitialized`: no engine connection. Steps fail; `reset` connects.
//! - `Ready`: one connection, one open document. Steps dispatch commands.
//! - `Closed`: connection released. Steps fail; `reset` starts over.
//!
//! Nothing here panics or returns `Err` to the caller: every failure surfaces
//! as an [`Observation`] with `success == false`.

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::error::EnvError;
use crate::core::reward;
use crate::core::types::{Action, EpisodeState, Observation};
use crate::handle::DocumentHandle;
use crate::handlers;
use crate::io::config::EnvConfig;
use crate::io::connect::connect_with_retry;
use crate::io::engine::{Connector, DocumentFormat};
use crate::io::memory::MemoryConnector;
use crate::registry::CommandRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Ready,
    Closed,
}

pub struct SpreadsheetEnv {
    connector: Box<dyn Connector>,
    registry: CommandRegistry,
    config: EnvConfig,
    handle: Option<DocumentHandle>,
    phase: Phase,
    episode_id: String,
    step_count: u64,
    resets: u64,
}

impl SpreadsheetEnv {
    pub fn new(connector: Box<dyn Connector>, config: EnvConfig) -> Self {
        Self {
            connector,
            registry: CommandRegistry::standard(),
            config,
            handle: None,
            phase: Phase::Uninitialized,
            episode_id: new_episode_id(),
            step_count: 0,
            resets: 0,
        }
    }

    /// Environment backed by the bundled in-memory engine.
    pub fn in_memory(config: EnvConfig) -> Self {
        let connector = MemoryConnector::new(config.export.clone());
        Self::new(Box::new(connector), config)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn state(&self) -> EpisodeState {
        EpisodeState {
            episode_id: self.episode_id.clone(),
            step_count: self.step_count,
            resets: self.resets,
        }
    }

    /// Start a fresh episode on a fresh connection.
    #[instrument(skip_all)]
    pub fn reset(&mut self) -> Observation {
        self.teardown(false);
        self.episode_id = new_episode_id();
        self.step_count = 0;
        self.resets += 1;
        self.phase = Phase::Uninitialized;

        let mut observation = match self.connect() {
            Ok(handle) => {
                let observation = Observation::success("Spreadsheet environment ready")
                    .with_current_sheet(handle.current_sheet())
                    .with_sheet_names(handle.sheet_names());
                self.handle = Some(handle);
                self.phase = Phase::Ready;
                info!(episode_id = %self.episode_id, "episode reset");
                observation
            }
            Err(message) => {
                warn!(episode_id = %self.episode_id, err = %message, "reset failed");
                Observation::failure("Failed to initialize spreadsheet engine", message)
            }
        };

        observation
            .metadata
            .insert("episode_id".to_string(), Value::String(self.episode_id.clone()));
        observation.reward = Some(reward::RESET);
        observation.done = false;
        observation
    }

    fn connect(&mut self) -> Result<DocumentHandle, String> {
        let engine = connect_with_retry(self.connector.as_mut(), &self.config.connect)
            .map_err(|err| err.to_string())?;
        let mut handle = DocumentHandle::open(engine).map_err(|err| err.to_string())?;

        if let Some(base) = self.config.base_document.clone() {
            match handle.replace_document(&base) {
                Ok(_) => debug!(path = %base.display(), "base document loaded"),
                Err(err) => {
                    warn!(path = %base.display(), err = %err, "failed to load base document, using blank document");
                }
            }
        }
        Ok(handle)
    }

    /// Execute one action. The step counter advances whatever the outcome.
    pub fn step(&mut self, action: &Action) -> Observation {
        self.step_count += 1;

        let result = match (self.phase, self.handle.as_mut()) {
            (Phase::Ready, Some(handle)) => self
                .registry
                .parse(action)
                .and_then(|command| handlers::execute(handle, command)),
            _ => Err(EnvError::NotInitialized),
        };

        let mut observation = match result {
            Ok(observation) => observation,
            Err(err) => {
                debug!(command = %action.command, kind = err.kind(), err = %err, "command failed");
                err.into_observation(&action.command)
            }
        };

        observation.metadata = step_metadata(self.step_count, &action.command, &self.episode_id);
        observation.reward = Some(reward::for_outcome(observation.success));
        observation.done = false;

        debug!(
            step = self.step_count,
            command = %action.command,
            success = observation.success,
            "step"
        );
        observation
    }

    /// Release the engine, saving the final document first when configured.
    /// Always succeeds and may be called repeatedly.
    #[instrument(skip_all)]
    pub fn close(&mut self) -> Observation {
        let saved = self.teardown(true);
        self.phase = Phase::Closed;

        let result = match saved {
            Some(Ok(path)) => format!("Spreadsheet environment closed; final document saved to {path}"),
            Some(Err(err)) => format!("Spreadsheet environment closed; failed to save final document: {err}"),
            None => "Spreadsheet environment closed".to_string(),
        };
        let mut observation = Observation::success(result);
        observation
            .metadata
            .insert("episode_id".to_string(), Value::String(self.episode_id.clone()));
        observation.done = false;
        observation
    }

    /// Best-effort release of the current handle. Each step is attempted even
    /// if an earlier one failed. Returns the outcome of saving the final
    /// document, if one was attempted.
    fn teardown(&mut self, persist: bool) -> Option<Result<String, String>> {
        let mut handle = self.handle.take()?;
        let mut saved = None;

        if persist && let Some(output) = self.config.output_document.clone() {
            let sheet = handle.current_sheet().to_string();
            let stored = output
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or(Ok(()), std::fs::create_dir_all)
                .map_err(|err| err.to_string())
                .and_then(|()| {
                    handle
                        .document_mut()
                        .store(&output, DocumentFormat::Native, &sheet)
                        .map_err(|err| err.to_string())
                });
            match stored {
                Ok(()) => {
                    info!(path = %output.display(), "final document saved");
                    saved = Some(Ok(output.display().to_string()));
                }
                Err(err) => {
                    warn!(path = %output.display(), err = %err, "failed to save final document");
                    saved = Some(Err(err));
                }
            }
        }

        if let Err(err) = handle.close_document() {
            warn!(err = %err, "failed to close document");
        }
        if let Err(err) = handle.terminate() {
            warn!(err = %err, "failed to terminate engine");
        }
        saved
    }
}

impl Drop for SpreadsheetEnv {
    fn drop(&mut self) {
        self.teardown(false);
    }
}

fn new_episode_id() -> String {
    Uuid::new_v4().to_string()
}

fn step_metadata(step: u64, command: &str, episode_id: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("step".to_string(), Value::from(step));
    metadata.insert("command".to_string(), Value::from(command));
    metadata.insert("episode_id".to_string(), Value::from(episode_id));
    metadata
}
