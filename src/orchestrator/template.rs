//! Prompt rendering seam between the chat layer and the orchestrator.

use std::collections::{BTreeMap, HashMap};

use crate::types::Prompt;

/// Display fields about the requesting user (username, totals, rank, ...).
/// Opaque to the orchestrator; only templates look inside.
pub type UserInfo = BTreeMap<String, String>;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer clearly and concisely in the user's language.";

/// Renders an incoming chat message into a provider prompt.
///
/// Whatever a template puts into the returned [`Prompt`] is covered by the cache
/// fingerprint, so personalised output is never shared across users by accident.
pub trait PromptTemplate: Send + Sync {
    fn render(&self, message: &str, context: &str, user_info: &UserInfo) -> Prompt;
}

/// Default template: base system prompt, then the per-context prompt, then one
/// `key: value` line per user-info field in key order.
#[derive(Debug, Clone)]
pub struct ContextTemplate {
    system_prompt: String,
    context_prompts: HashMap<String, String>,
}

impl Default for ContextTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl ContextTemplate {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            context_prompts: HashMap::new(),
        }
    }

    pub fn with_context_prompt(
        mut self,
        context: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        self.context_prompts.insert(context.into(), prompt.into());
        self
    }

    pub fn with_context_prompts(mut self, prompts: HashMap<String, String>) -> Self {
        self.context_prompts.extend(prompts);
        self
    }
}

impl PromptTemplate for ContextTemplate {
    fn render(&self, message: &str, context: &str, user_info: &UserInfo) -> Prompt {
        let mut system = self.system_prompt.trim().to_string();
        if let Some(extra) = self.context_prompts.get(context) {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(extra.trim());
        }
        if !user_info.is_empty() {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str("User information:");
            for (k, v) in user_info {
                system.push_str(&format!("\n- {}: {}", k, v));
            }
        }
        Prompt::user(message).with_system(system)
    }
}

/// Passes the message through with no system text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTemplate;

impl PromptTemplate for PlainTemplate {
    fn render(&self, message: &str, _context: &str, _user_info: &UserInfo) -> Prompt {
        Prompt::user(message)
    }
}
