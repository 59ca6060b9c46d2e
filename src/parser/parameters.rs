//! `${NAME}` parameter substitution

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, NoExpand, Regex};

use crate::model::Script;

static PARAMETER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{(\w+)\}").unwrap());

/// `\b` only makes sense next to a word character
fn word_boundary(edge: Option<char>) -> &'static str {
    match edge {
        Some(c) if c.is_alphanumeric() || c == '_' => r"\b",
        _ => "",
    }
}

/// Replaces `${NAME}` placeholders with profile values, and turns concrete
/// values back into placeholders when scripts are exported.
#[derive(Debug, Clone, Default)]
pub struct ParameterInjector {
    parameters: BTreeMap<String, String>,
    // Values longest first, each with a word-bounded matcher
    reverse: Vec<(Regex, String)>,
}

impl ParameterInjector {
    pub fn new(parameters: BTreeMap<String, String>) -> Self {
        let mut values: Vec<(&String, &String)> = parameters
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();
        values.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

        let reverse = values
            .into_iter()
            .filter_map(|(name, value)| {
                let pattern = format!(
                    "(?i){}{}{}",
                    word_boundary(value.chars().next()),
                    regex::escape(value),
                    word_boundary(value.chars().last())
                );
                Regex::new(&pattern)
                    .ok()
                    .map(|re| (re, format!("${{{}}}", name)))
            })
            .collect();

        Self {
            parameters,
            reverse,
        }
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Substitute known placeholders in `text`; unknown ones are left as-is.
    pub fn inject(&self, text: &str) -> String {
        PARAMETER_RE
            .replace_all(text, |caps: &Captures| {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                self.parameters
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Inject into the script body only
    pub fn inject_parameters(&self, script: &mut Script) {
        let content = self.inject(script.content());
        script.set_content(&content);
    }

    /// Inject into the body and into rollback/verify SQL
    pub fn inject_parameters_all(&self, script: &mut Script) {
        self.inject_parameters(script);
        let rollback = script.rollback().map(|r| self.inject(r));
        let verify = script.verify().map(|v| self.inject(v));
        script.set_rollback(rollback);
        script.set_verify(verify);
    }

    /// Resolve placeholders in object names (e.g. configured table names),
    /// uppercasing the result to match full object names.
    pub fn inject_into_names<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        names
            .into_iter()
            .map(|name| self.inject(name).to_uppercase())
            .collect()
    }

    /// Replace parameter values with their placeholders, longest value first
    pub fn parametrize(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (re, placeholder) in &self.reverse {
            result = re
                .replace_all(&result, NoExpand(placeholder))
                .into_owned();
        }
        result
    }

    pub fn parametrize_script(&self, script: &mut Script) {
        let content = self.parametrize(script.content());
        script.set_content(&content);
    }
}
