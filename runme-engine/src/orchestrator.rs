//! Save orchestration
//!
//! One save runs parse → evaluate → generate → serialize as a straight line.
//! Saves of different documents run in parallel; a second save of a document
//! that is still in flight is rejected, never queued.

use crate::assign::{apply_plan, AssignedIdentities};
use crate::policy::evaluate;
use crate::store::{outputs_path, relative_path, DocumentKey, DocumentStore, StoreError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use runme_core::{
    Document, IdentityCollisionError, IdentityGenerator, LifecycleSetting, ParseError,
    SerializationContractViolation, UlidGenerator,
};
use runme_markdown::{parse, render};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

// ============================================================================
// STATE & ERRORS
// ============================================================================

/// Stage of an in-flight save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SaveState {
    /// No save running for the document.
    Idle,
    /// Reading and parsing the document text.
    Parsing,
    /// Deciding which identities are missing.
    Evaluating,
    /// Drawing new identities.
    Generating,
    /// Rendering the updated document.
    Serializing,
    /// The save failed; cleared when it returns.
    Failed,
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SaveState::Idle => "idle",
            SaveState::Parsing => "parsing",
            SaveState::Evaluating => "evaluating",
            SaveState::Generating => "generating",
            SaveState::Serializing => "serializing",
            SaveState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Why a save did not complete. The stored document is left untouched.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Identity error: {0}")]
    Collision(#[from] IdentityCollisionError),

    #[error("Serialization contract violation: {0}")]
    Contract(#[from] SerializationContractViolation),

    #[error("Save already in progress for {key}")]
    SaveInProgress { key: DocumentKey },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl SaveError {
    /// Engine defect rather than a problem with the user's document.
    pub fn is_internal(&self) -> bool {
        matches!(self, SaveError::Collision(_) | SaveError::Contract(_))
    }
}

/// Result of a successful save.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// Text to persist.
    pub text: String,
    /// Model of `text`, with any new identities.
    pub document: Document,
    /// Whether `text` differs from the input.
    pub changed: bool,
    pub assigned: AssignedIdentities,
}

// ============================================================================
// IN-FLIGHT REGISTRY
// ============================================================================

type Registry = DashMap<DocumentKey, SaveState>;

/// Marks a document as in flight until dropped.
struct InFlightGuard<'a> {
    registry: &'a Registry,
    key: DocumentKey,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(registry: &'a Registry, key: DocumentKey) -> Result<Self, SaveError> {
        match registry.entry(key.clone()) {
            Entry::Occupied(_) => Err(SaveError::SaveInProgress { key }),
            Entry::Vacant(vacant) => {
                vacant.insert(SaveState::Parsing);
                Ok(Self { registry, key })
            }
        }
    }

    fn transition(&self, state: SaveState) {
        if let Some(mut current) = self.registry.get_mut(&self.key) {
            debug!(from = %*current, to = %state, "save state");
            *current = state;
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Runs saves and tracks which documents have one in flight.
///
/// Cheap to clone; clones share the registry and generator.
#[derive(Clone)]
pub struct SaveOrchestrator {
    generator: Arc<dyn IdentityGenerator>,
    in_flight: Arc<Registry>,
}

impl fmt::Debug for SaveOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveOrchestrator")
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl Default for SaveOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveOrchestrator {
    /// Orchestrator drawing from the process-wide [`UlidGenerator`].
    pub fn new() -> Self {
        Self::with_generator(UlidGenerator::shared())
    }

    pub fn with_generator<G>(generator: G) -> Self
    where
        G: IdentityGenerator + 'static,
    {
        Self {
            generator: Arc::new(generator),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Current stage of the save running for `key`.
    pub fn state(&self, key: &DocumentKey) -> SaveState {
        self.in_flight
            .get(key)
            .map(|state| *state)
            .unwrap_or(SaveState::Idle)
    }

    /// Number of saves currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Applies the lifecycle policy to `text` and returns what to persist.
    ///
    /// # Errors
    /// - [`SaveError::SaveInProgress`] when `key` already has a save running
    /// - [`SaveError::Parse`] when `text` is not a well-formed notebook
    /// - [`SaveError::Collision`] or [`SaveError::Contract`] on engine defects
    pub fn save(
        &self,
        key: impl Into<DocumentKey>,
        text: &str,
        setting: LifecycleSetting,
    ) -> Result<SaveOutcome, SaveError> {
        let key = key.into();
        let span = info_span!("save", document = %key, setting = %setting);
        let _enter = span.enter();

        let guard = InFlightGuard::acquire(&self.in_flight, key)?;
        self.run(&guard, text, setting)
    }

    /// Reads `key` from `store`, saves it, and writes it back when it changed.
    pub async fn save_file<S>(
        &self,
        store: &S,
        key: impl Into<DocumentKey>,
        setting: LifecycleSetting,
    ) -> Result<SaveOutcome, SaveError>
    where
        S: DocumentStore + ?Sized,
    {
        let key = key.into();
        let span = info_span!("save_file", document = %key, setting = %setting);

        async move {
            let guard = InFlightGuard::acquire(&self.in_flight, key.clone())?;
            let text = store
                .read(&key)
                .await
                .map_err(|e| fail(&guard, SaveError::from(e)))?;
            let outcome = self.run(&guard, &text, setting)?;
            if outcome.changed {
                store
                    .write(&key, &outcome.text)
                    .await
                    .map_err(|e| fail(&guard, SaveError::from(e)))?;
                info!(bytes = outcome.text.len(), "document written");
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    /// Saves the notebook, then writes its session outputs document.
    ///
    /// The outputs document is the saved notebook bound to `session_id`
    /// through `runme.session`, stored at [`outputs_path`]. Returns its key.
    pub async fn save_session_outputs<S>(
        &self,
        store: &S,
        notebook: impl Into<DocumentKey>,
        session_id: &str,
        outputs_dir: Option<&Path>,
        setting: LifecycleSetting,
    ) -> Result<DocumentKey, SaveError>
    where
        S: DocumentStore + ?Sized,
    {
        let notebook = notebook.into();
        let outcome = self.save_file(store, notebook.clone(), setting).await?;

        let outputs = DocumentKey::from(outputs_path(
            notebook.as_path(),
            session_id,
            outputs_dir,
        ));
        let span = info_span!("save_session_outputs", document = %outputs, session = session_id);

        async move {
            let guard = InFlightGuard::acquire(&self.in_flight, outputs.clone())?;
            guard.transition(SaveState::Serializing);

            let base = outputs.as_path().parent().unwrap_or_else(|| Path::new(""));
            let relative = relative_path(notebook.as_path(), base).unwrap_or_else(|| {
                warn!(notebook = %notebook, "notebook path cannot be made relative to session outputs");
                notebook.as_str().to_string()
            });

            let mut document = outcome.document;
            document.bind_session(session_id, &relative);
            let text = render(&document).map_err(|e| fail(&guard, SaveError::from(e)))?;
            store
                .write(&outputs, &text)
                .await
                .map_err(|e| fail(&guard, SaveError::from(e)))?;

            info!(bytes = text.len(), "session outputs written");
            Ok(outputs)
        }
        .instrument(span)
        .await
    }

    fn run(
        &self,
        guard: &InFlightGuard<'_>,
        text: &str,
        setting: LifecycleSetting,
    ) -> Result<SaveOutcome, SaveError> {
        self.pipeline(guard, text, setting)
            .map_err(|e| fail(guard, e))
    }

    fn pipeline(
        &self,
        guard: &InFlightGuard<'_>,
        text: &str,
        setting: LifecycleSetting,
    ) -> Result<SaveOutcome, SaveError> {
        guard.transition(SaveState::Parsing);
        let mut document = parse(text)?;
        for id in document.duplicate_cell_ids() {
            warn!(identity = id, "cell identity used more than once");
        }

        guard.transition(SaveState::Evaluating);
        let plan = evaluate(&document, setting);
        if plan.is_empty() {
            debug!("no identities to create");
            return Ok(SaveOutcome {
                text: text.to_string(),
                document,
                changed: false,
                assigned: AssignedIdentities::default(),
            });
        }

        guard.transition(SaveState::Generating);
        let assigned = apply_plan(&mut document, &plan, self.generator.as_ref())?;

        guard.transition(SaveState::Serializing);
        let rendered = render(&document)?;
        let changed = rendered != text;

        info!(
            document_identity = assigned.document.is_some(),
            cell_identities = assigned.cells.len(),
            changed,
            "identities assigned"
        );

        Ok(SaveOutcome {
            text: rendered,
            document,
            changed,
            assigned,
        })
    }
}

/// Records a failed save and passes the error through.
fn fail(guard: &InFlightGuard<'_>, err: SaveError) -> SaveError {
    guard.transition(SaveState::Failed);
    if err.is_internal() {
        error!(error = %err, "save failed");
    } else {
        warn!(error = %err, "save failed");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use runme_core::CellRef;
    use runme_test_utils::{fixtures, identity, FixedGenerator, SequenceGenerator};

    fn orchestrator() -> SaveOrchestrator {
        SaveOrchestrator::with_generator(SequenceGenerator::new())
    }

    #[test]
    fn test_save_assigns_and_renders() {
        let outcome = orchestrator()
            .save("shebang.md", fixtures::SHEBANG, LifecycleSetting::All)
            .unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.assigned.len(), 2);
        let cell_id = outcome.assigned.cell(CellRef(0)).unwrap().to_string();
        assert!(outcome.text.contains(&format!("{{\"name\":\"foo\",\"id\":\"{cell_id}\"}}")));
        assert_eq!(outcome.document.cell(CellRef(0)).unwrap().identity(), Some(cell_id.as_str()));
    }

    #[test]
    fn test_unchanged_save_returns_input() {
        let outcome = orchestrator()
            .save("doc.md", fixtures::FULLY_POPULATED, LifecycleSetting::All)
            .unwrap();
        assert!(!outcome.changed);
        assert!(outcome.assigned.is_empty());
        assert_eq!(outcome.text, fixtures::FULLY_POPULATED);
    }

    #[test]
    fn test_registry_is_cleared_after_success_and_failure() {
        let orchestrator = orchestrator();
        let key = DocumentKey::from("doc.md");
        orchestrator.save(key.clone(), fixtures::SHEBANG, LifecycleSetting::All).unwrap();
        assert_eq!(orchestrator.state(&key), SaveState::Idle);

        let err = orchestrator
            .save(key.clone(), fixtures::UNTERMINATED_FENCE, LifecycleSetting::All)
            .unwrap_err();
        assert!(matches!(err, SaveError::Parse(_)));
        assert!(!err.is_internal());
        assert_eq!(orchestrator.state(&key), SaveState::Idle);
        assert_eq!(orchestrator.in_flight(), 0);
    }

    #[test]
    fn test_collision_is_internal() {
        let orchestrator = SaveOrchestrator::with_generator(FixedGenerator(identity(
            fixtures::EXISTENT_CELL_IDENTITY,
        )));
        let err = orchestrator
            .save("cell.md", fixtures::EXISTENT_CELL_ID, LifecycleSetting::All)
            .unwrap_err();
        assert!(matches!(err, SaveError::Collision(_)));
        assert!(err.is_internal());
    }

    #[test]
    fn test_contract_violation_is_internal() {
        let err = orchestrator()
            .save("bare.md", fixtures::BARE_FENCE, LifecycleSetting::Cell)
            .unwrap_err();
        assert!(matches!(err, SaveError::Contract(_)));
        assert!(err.is_internal());
    }

    #[test]
    fn test_in_progress_key_is_rejected() {
        let orchestrator = orchestrator();
        let key = DocumentKey::from("busy.md");
        let _guard = InFlightGuard::acquire(&orchestrator.in_flight, key.clone()).unwrap();
        assert_eq!(orchestrator.state(&key), SaveState::Parsing);

        let err = orchestrator
            .save(key.clone(), fixtures::SHEBANG, LifecycleSetting::All)
            .unwrap_err();
        assert!(matches!(err, SaveError::SaveInProgress { .. }));
        assert!(orchestrator.save("other.md", fixtures::SHEBANG, LifecycleSetting::All).is_ok());
    }
}
