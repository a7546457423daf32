use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{SelectionContext, SelectionModeProvider};
use crate::error::SelectionError;
use crate::sources::ConfigurationSource;

/// Uses the configuration value at the selector path verbatim as the key.
///
/// Strings are used as-is; numbers and booleans by their JSON text (`3`, `true`).
/// Null and empty strings mean no opinion. Arrays and objects are rejected.
pub struct ConfigurationValueProvider {
    config: Arc<dyn ConfigurationSource>,
}

impl ConfigurationValueProvider {
    #[must_use]
    pub fn new(config: Arc<dyn ConfigurationSource>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SelectionModeProvider for ConfigurationValueProvider {
    async fn select_key(&self, ctx: &SelectionContext<'_>) -> Result<Option<String>, SelectionError> {
        let path = ctx.selector_name();
        let value = self
            .config
            .value(path)
            .await?
            .ok_or_else(|| SelectionError::ValueMissing {
                path: path.to_string(),
            })?;
        let key = match value {
            Value::Null => return Ok(None),
            Value::String(s) if s.is_empty() => return Ok(None),
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(SelectionError::UnsupportedValue {
                    path: path.to_string(),
                })
            }
        };
        Ok(Some(key))
    }
}
