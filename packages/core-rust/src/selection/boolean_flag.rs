use std::sync::Arc;

use async_trait::async_trait;

use super::{SelectionContext, SelectionModeProvider};
use crate::error::SelectionError;
use crate::sources::FeatureFlagSource;

/// Maps a boolean flag onto the keys `"true"` and `"false"`.
///
/// The selector name is the flag name. When the key matching the flag state is
/// not a trial key the provider has no opinion and the default key is used.
pub struct BooleanFlagProvider {
    flags: Arc<dyn FeatureFlagSource>,
}

impl BooleanFlagProvider {
    pub const TRUE_KEY: &'static str = "true";
    pub const FALSE_KEY: &'static str = "false";

    #[must_use]
    pub fn new(flags: Arc<dyn FeatureFlagSource>) -> Self {
        Self { flags }
    }
}

#[async_trait]
impl SelectionModeProvider for BooleanFlagProvider {
    async fn select_key(&self, ctx: &SelectionContext<'_>) -> Result<Option<String>, SelectionError> {
        let flag = ctx.selector_name();
        let enabled = self
            .flags
            .is_enabled(flag)
            .await?
            .ok_or_else(|| SelectionError::FlagUndefined {
                flag: flag.to_string(),
            })?;
        let key = if enabled { Self::TRUE_KEY } else { Self::FALSE_KEY };
        Ok(ctx.is_candidate(key).then(|| key.to_string()))
    }
}
