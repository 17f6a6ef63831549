//! Move and rank commands.

use std::fs;

use super::ChangeEvent;
use super::create::guard_local_card;
use crate::cache::CardCache;
use crate::domain::{CardKey, Rank};
use crate::error::CardoError;
use crate::paths::CHILDREN_DIR;
use crate::project::{Project, parse_card_key};

impl Project {
    /// Move a card (and its subtree) under a new parent, or to the card root
    /// when `new_parent` is `None`.
    pub fn move_card(&self, key: &str, new_parent: Option<&str>) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        let new_parent = new_parent.map(parse_card_key).transpose()?;
        self.lock.with_writer("move card", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &key)?;

            if state.cards.is_template_card(&key) {
                return Err(CardoError::InvalidInput(format!(
                    "Template card '{key}' cannot be moved between containers"
                )));
            }
            let record = state.cards.find(&key)?;
            let old_path = record.path.clone();

            let new_dir = match &new_parent {
                Some(parent_key) => {
                    if parent_key == &key {
                        return Err(CardoError::CycleForbidden {
                            card: key.to_string(),
                            target: parent_key.to_string(),
                        });
                    }
                    if state.cards.is_template_card(parent_key) {
                        return Err(CardoError::InvalidInput(format!(
                            "Cannot move project card '{key}' under template card '{parent_key}'"
                        )));
                    }
                    let parent_record = state.cards.find(parent_key)?;
                    if state.cards.is_ancestor(&key, parent_key)? {
                        return Err(CardoError::CycleForbidden {
                            card: key.to_string(),
                            target: parent_key.to_string(),
                        });
                    }
                    parent_record.path.join(CHILDREN_DIR).join(key.as_str())
                }
                None => self.paths().card_root().join(key.as_str()),
            };
            if new_dir == old_path {
                return Ok(());
            }

            // Rank the card after the destination's last child.
            let rank = match &new_parent {
                Some(parent_key) => state
                    .cards
                    .find(parent_key)?
                    .children
                    .iter()
                    .filter(|k| *k != &key)
                    .next_back()
                    .and_then(|k| state.cards.find(k).ok())
                    .map(|r| Rank::after(&r.metadata.rank)),
                None => state
                    .cards
                    .cards(None)?
                    .iter()
                    .filter(|r| r.parent.is_none() && r.key != key)
                    .next_back()
                    .map(|r| Rank::after(&r.metadata.rank)),
            }
            .unwrap_or_else(Rank::first);

            token.check("move card")?;
            if let Some(parent_dir) = new_dir.parent() {
                fs::create_dir_all(parent_dir).map_err(|e| CardoError::write(parent_dir, e))?;
            }
            fs::rename(&old_path, &new_dir).map_err(|e| CardoError::write(&new_dir, e))?;

            state.cards.reparent(&key, new_parent.clone(), new_dir)?;
            let mut metadata = state.cards.find(&key)?.metadata.clone();
            metadata.rank = rank;
            state.cards.update_metadata(&key, metadata)?;
            let record = state.cards.find(&key)?;
            CardCache::save_metadata(record)?;

            // Parent/child links permeate the tree: rebuild all card programs.
            self.ensure_engine(state)?;
            self.engine.handle_card_moved(&state.engine_inputs())?;
            Ok(())
        })?;
        self.emit(&ChangeEvent::CardMoved(key));
        Ok(())
    }

    /// Reorder a card among its siblings to the given position.
    pub fn rank_by_index(&self, key: &str, index: usize) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        self.lock.with_writer("rank card", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &key)?;

            let siblings: Vec<CardKey> = state
                .cards
                .siblings(&key)?
                .into_iter()
                .filter(|k| k != &key)
                .collect();
            if index > siblings.len() {
                return Err(CardoError::InvalidTargetIndex {
                    index,
                    len: siblings.len() + 1,
                });
            }

            let lower = index
                .checked_sub(1)
                .and_then(|i| siblings.get(i))
                .and_then(|k| state.cards.find(k).ok())
                .map(|r| r.metadata.rank.clone());
            let upper = siblings
                .get(index)
                .and_then(|k| state.cards.find(k).ok())
                .map(|r| r.metadata.rank.clone());
            let rank = Rank::between(lower.as_ref(), upper.as_ref())?;

            let mut metadata = state.cards.find(&key)?.metadata.clone();
            metadata.rank = rank;
            state.cards.update_metadata(&key, metadata)?;
            let record = state.cards.find(&key)?;
            CardCache::save_metadata(record)?;
            self.engine.handle_card_changed(record, None);
            Ok(())
        })?;
        self.emit(&ChangeEvent::CardChanged(key));
        Ok(())
    }

    /// Rewrite the ranks of one card's siblings (itself included) so they
    /// are evenly distributed again.
    pub fn rebalance_ranks(&self, parent: Option<&str>) -> Result<(), CardoError> {
        let parent = parent.map(parse_card_key).transpose()?;
        let changed = self.lock.with_writer("rebalance ranks", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            let keys: Vec<CardKey> = match &parent {
                Some(parent_key) => state.cards.find(parent_key)?.children.clone(),
                None => state
                    .cards
                    .cards(None)?
                    .iter()
                    .filter(|r| r.parent.is_none())
                    .map(|r| r.key.clone())
                    .collect(),
            };
            let ranks = Rank::distribute(keys.len());
            for (key, rank) in keys.iter().zip(ranks) {
                let mut metadata = state.cards.find(key)?.metadata.clone();
                metadata.rank = rank;
                state.cards.update_metadata(key, metadata)?;
                let record = state.cards.find(key)?;
                CardCache::save_metadata(record)?;
                self.engine.handle_card_changed(record, None);
            }
            Ok(keys)
        })?;
        for key in changed {
            self.emit(&ChangeEvent::CardChanged(key));
        }
        Ok(())
    }
}
