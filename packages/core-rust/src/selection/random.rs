use async_trait::async_trait;
use rand::seq::IndexedRandom;

use super::{SelectionContext, SelectionModeProvider};
use crate::error::SelectionError;

/// Picks one of the candidate keys uniformly at random on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomProvider;

#[async_trait]
impl SelectionModeProvider for RandomProvider {
    async fn select_key(&self, ctx: &SelectionContext<'_>) -> Result<Option<String>, SelectionError> {
        let key = {
            let mut rng = rand::rng();
            ctx.candidate_keys().choose(&mut rng).cloned()
        };
        Ok(key)
    }
}
