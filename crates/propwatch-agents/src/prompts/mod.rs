//! Prompt templates, grouped per sport.
//!
//! User templates use `{name}` placeholders; `{{` and `}}` are literal braces.
//! Rendering is strict: the variables supplied must be exactly the
//! placeholders the template uses.

mod soccer;

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};

use crate::error::AgentError;

/// System prompt plus user template for one agent.
pub trait AgentPrompt: Send + Sync {
    fn system_prompt(&self) -> String;

    fn user_template(&self) -> &'static str;

    fn render_user(&self, vars: &[(&str, String)]) -> Result<String, AgentError> {
        render_strict(self.user_template(), vars)
    }
}

/// Every agent prompt for one sport.
#[derive(Clone)]
pub struct SportPrompts {
    pub name: &'static str,
    pub research: Arc<dyn AgentPrompt>,
    pub analyst: Arc<dyn AgentPrompt>,
    pub shark: Arc<dyn AgentPrompt>,
}

impl std::fmt::Debug for SportPrompts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SportPrompts").field("name", &self.name).finish()
    }
}

const SPORTS: [&str; 1] = ["soccer"];

pub fn sport_prompts(sport: &str) -> Result<SportPrompts, AgentError> {
    match sport.trim().to_lowercase().as_str() {
        "soccer" | "football" => Ok(soccer::prompts()),
        other => Err(AgentError::Prompt(format!(
            "Unknown sport: {other}. Available: {}",
            SPORTS.join(", ")
        ))),
    }
}

fn placeholder_regex() -> Result<&'static Regex, AgentError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}"))
        .as_ref()
        .map_err(|e| AgentError::Prompt(format!("placeholder pattern: {e}")))
}

/// Placeholder names used by a template.
pub fn placeholders(template: &str) -> BTreeSet<String> {
    let Ok(re) = placeholder_regex() else {
        return BTreeSet::new();
    };
    re.captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Substitute `vars` into `template` in a single pass.
///
/// Missing or unexpected variables are an error. Substituted values are not
/// rescanned, so braces inside them are kept as-is.
pub fn render_strict(template: &str, vars: &[(&str, String)]) -> Result<String, AgentError> {
    let expected = placeholders(template);
    let provided: BTreeSet<String> = vars.iter().map(|(k, _)| k.to_string()).collect();
    if expected != provided {
        let missing: Vec<_> = expected.difference(&provided).cloned().collect();
        let extra: Vec<_> = provided.difference(&expected).cloned().collect();
        return Err(AgentError::Prompt(format!(
            "template variables do not match: missing {missing:?}, unexpected {extra:?}"
        )));
    }

    let rendered = placeholder_regex()?.replace_all(template, |caps: &Captures<'_>| {
        match caps.get(1) {
            Some(name) => vars
                .iter()
                .find(|(k, _)| *k == name.as_str())
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
            None if &caps[0] == "{{" => "{".to_string(),
            None => "}".to_string(),
        }
    });
    Ok(rendered.into_owned())
}
