//! Safe-default text returned when no provider could answer.

use std::collections::HashMap;

pub const DEFAULT_APOLOGY: &str =
    "Sorry, I can't answer right now. Please try again in a moment.";

/// Context tag -> apology text, with a non-empty default for unknown tags.
#[derive(Debug, Clone)]
pub struct FallbackMessages {
    default: String,
    by_context: HashMap<String, String>,
}

impl Default for FallbackMessages {
    fn default() -> Self {
        Self {
            default: DEFAULT_APOLOGY.to_string(),
            by_context: HashMap::new(),
        }
    }
}

impl FallbackMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the generic apology. Blank text keeps the built-in one.
    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.default = text;
        }
        self
    }

    /// Blank text is ignored so a context can never resolve to an empty reply.
    pub fn with_message(mut self, context: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.by_context.insert(context.into(), text);
        }
        self
    }

    /// Build from a config map; the `default` key overrides the generic apology.
    pub fn from_map(map: HashMap<String, String>) -> Self {
        map.into_iter()
            .fold(Self::default(), |acc, (context, text)| {
                if context == "default" {
                    acc.with_default(text)
                } else {
                    acc.with_message(context, text)
                }
            })
    }

    pub fn message_for(&self, context: &str) -> &str {
        self.by_context
            .get(context)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }
}
