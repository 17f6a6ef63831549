//! Workflow transitions.

use super::ChangeEvent;
use super::create::guard_local_card;
use crate::cache::CardCache;
use crate::error::CardoError;
use crate::project::{Project, parse_card_key};

impl Project {
    /// Apply a named workflow transition to a card.
    ///
    /// The transition is resolved from the card's current state, with `"*"`
    /// as the wildcard origin. A transition whose target equals the current
    /// state succeeds without writing anything.
    pub fn transition_card(&self, key: &str, transition: &str) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        let changed = self.lock.with_writer("transition card", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &key)?;

            let record = state.cards.find(&key)?;
            let current = record.metadata.workflow_state.clone();
            let card_type = state.resources.card_type(&record.metadata.card_type)?;
            let workflow = state.resources.workflow(&card_type.show().workflow)?;
            let data = workflow.show();

            // Re-applying a transition that already happened is a no-op
            // success, so a double submit never errors.
            let same_state = data
                .transitions
                .iter()
                .any(|t| t.name == transition && t.to_state == current);
            if same_state {
                return Ok(false);
            }

            let Some(resolved) = data.transition_from(&current, transition) else {
                return Err(CardoError::IllegalTransition {
                    card: key.to_string(),
                    transition: transition.to_string(),
                    state: current,
                });
            };
            let to_state = resolved.to_state.clone();

            let mut metadata = record.metadata.clone();
            metadata.workflow_state = to_state;
            state.cards.update_metadata(&key, metadata)?;
            let record = state.cards.find(&key)?;
            CardCache::save_metadata(record)?;
            self.engine.handle_card_changed(record, None);
            Ok(true)
        })?;
        if changed {
            self.emit(&ChangeEvent::CardChanged(key));
        }
        Ok(())
    }
}
