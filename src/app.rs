use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extract::{apply_title_input, ExtractedFields};
use crate::generation::{GenerationError, TextGenerator};
use crate::history::{HistoryItem, HistoryStore};
use crate::params::{ScriptParams, ValidationError};
use crate::prompt::build_user_prompt;
use crate::storage::KeyValueStore;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("a generation request is already in flight")]
    Busy,
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Everything a front-end renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub params: ScriptParams,
    pub output: String,
    pub error: Option<String>,
}

struct InFlight {
    ticket: u64,
    cancel: CancellationToken,
}

/// A request that has passed validation and holds the in-flight slot until
/// it is handed back to [`ScriptEngine::complete_generate`] or
/// [`ScriptEngine::fail_generate`].
#[derive(Debug)]
pub struct PendingGeneration {
    ticket: u64,
    snapshot: ScriptParams,
    prompt: String,
    cancel: CancellationToken,
}

impl PendingGeneration {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn params(&self) -> &ScriptParams {
        &self.snapshot
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Owns the working parameters, the last output, the current error and the
/// history, and only changes them through the transitions below.
pub struct ScriptEngine<S: KeyValueStore> {
    generator: Arc<dyn TextGenerator>,
    system_instruction: String,
    history: HistoryStore<S>,
    state: AppState,
    in_flight: Option<InFlight>,
    next_ticket: u64,
    shutdown: CancellationToken,
}

impl<S: KeyValueStore> ScriptEngine<S> {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        system_instruction: String,
        history: HistoryStore<S>,
    ) -> Self {
        Self {
            generator,
            system_instruction,
            history,
            state: AppState::default(),
            in_flight: None,
            next_ticket: 1,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn params(&self) -> &ScriptParams {
        &self.state.params
    }

    pub fn history(&self) -> &HistoryStore<S> {
        &self.history
    }

    pub fn can_submit(&self) -> bool {
        !self.is_generating() && self.state.params.can_submit()
    }

    /// True while a request holds the slot and has not been cancelled.
    pub fn is_generating(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|in_flight| !in_flight.cancel.is_cancelled())
    }

    /// Cancelling this token aborts the in-flight request and any started
    /// later.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn set_params(&mut self, params: ScriptParams) {
        self.state.params = params;
    }

    /// Feeds title-field input through the bulk-paste extractor.
    pub fn apply_title_input(&mut self, input: &str) -> ExtractedFields {
        apply_title_input(&mut self.state.params, input)
    }

    pub fn begin_generate(&mut self) -> Result<PendingGeneration, SubmitError> {
        if let Some(in_flight) = &self.in_flight {
            if !in_flight.cancel.is_cancelled() {
                warn!("Generation already in progress, ignoring submit");
                return Err(SubmitError::Busy);
            }
            // A cancelled request no longer holds the slot; its late result is ignored.
            debug!(ticket = in_flight.ticket, "Reclaiming slot from cancelled request");
            self.in_flight = None;
        }
        self.state.params.validate()?;

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let cancel = self.shutdown.child_token();

        self.in_flight = Some(InFlight {
            ticket,
            cancel: cancel.clone(),
        });
        self.state.error = None;

        let snapshot = self.state.params.clone();
        let prompt = build_user_prompt(&snapshot);
        debug!(
            ticket,
            script_type = ?snapshot.script_type,
            prompt_chars = prompt.chars().count(),
            "Generation started"
        );

        Ok(PendingGeneration {
            ticket,
            snapshot,
            prompt,
            cancel,
        })
    }

    /// Publishes a successful result. Scripts are also recorded in history;
    /// research guides are not. Returns `false` for a stale request.
    pub fn complete_generate(&mut self, pending: PendingGeneration, content: String) -> bool {
        if !self.release(pending.ticket) {
            return false;
        }

        self.state.output = content.clone();
        self.state.error = None;

        if pending.snapshot.script_type.is_script() {
            let item = HistoryItem::new(pending.snapshot, content);
            let id = item.id.clone();
            match self.history.insert(item) {
                Ok(()) => info!("💾 Saved generation {} to history", id),
                Err(err) => warn!("Failed to save generation to history: {:#}", err),
            }
        }

        true
    }

    /// Records a failure. The previous output is left untouched.
    pub fn fail_generate(&mut self, pending: PendingGeneration, error: &GenerationError) -> bool {
        if !self.release(pending.ticket) {
            return false;
        }

        warn!("❌ {}", error);
        self.state.error = Some(error.to_string());
        true
    }

    /// Validates, runs one generation and applies the result.
    ///
    /// Dropping the returned future before it resolves cancels the request
    /// and frees the in-flight slot.
    pub async fn submit(&mut self) -> Result<String, SubmitError> {
        let pending = self.begin_generate()?;
        let generator = Arc::clone(&self.generator);

        info!(
            "🚀 Generating {} via {}",
            pending.snapshot.script_type,
            generator.label()
        );

        let mut slot = SlotGuard {
            ticket: Some(pending.ticket),
            engine: self,
        };
        let result = generator
            .generate(
                &pending.prompt,
                &slot.engine.system_instruction,
                &pending.cancel,
            )
            .await;
        slot.ticket = None;

        match result {
            Ok(content) => {
                slot.engine.complete_generate(pending, content.clone());
                Ok(content)
            }
            Err(err) => {
                slot.engine.fail_generate(pending, &err);
                Err(err.into())
            }
        }
    }

    /// Cancels the in-flight request, if any. The slot is free for the next
    /// `begin_generate` even if the cancelled request never reports back.
    pub fn cancel_in_flight(&self) -> bool {
        match &self.in_flight {
            Some(in_flight) => {
                in_flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Loads the stored snapshot with exactly this `id` back into the
    /// working state.
    pub fn select_history(&mut self, id: &str) -> Option<&HistoryItem> {
        let (params, content) = self.history.restore(id)?;

        self.state.params = params;
        self.state.output = content;
        self.state.error = None;
        self.history.get(id)
    }

    /// Removes the item with exactly this `id`. An unknown id is a no-op.
    pub fn delete_history(&mut self, id: &str) -> Result<bool> {
        let removed = self.history.remove(id)?;
        if !removed {
            debug!("No history item with id {}", id);
        }
        Ok(removed)
    }

    pub fn dismiss_error(&mut self) {
        self.state.error = None;
    }

    fn abandon(&mut self, ticket: u64) {
        if let Some(in_flight) = &self.in_flight {
            if in_flight.ticket == ticket {
                in_flight.cancel.cancel();
                self.in_flight = None;
                debug!(ticket, "Generation dropped before completion, slot released");
            }
        }
    }

    fn release(&mut self, ticket: u64) -> bool {
        match &self.in_flight {
            Some(in_flight) if in_flight.ticket == ticket => {
                self.in_flight = None;
                true
            }
            _ => {
                warn!(ticket, "Ignoring result for a request that is no longer in flight");
                false
            }
        }
    }
}

/// Frees the in-flight slot if `submit` is dropped mid-request.
struct SlotGuard<'a, S: KeyValueStore> {
    engine: &'a mut ScriptEngine<S>,
    ticket: Option<u64>,
}

impl<S: KeyValueStore> Drop for SlotGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.engine.abandon(ticket);
        }
    }
}
