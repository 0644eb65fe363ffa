//! Script variables

use indexmap::IndexMap;

/// Name of the variable holding the installer's source directory.
pub const SOURCE_DIRECTORY_VARIABLE: &str = "INST";

/// Variables set while the script runs, in the order they were first set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    variables: IndexMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment with `INST` bound to `source_directory`.
    pub fn with_source_directory(source_directory: impl Into<String>) -> Self {
        let mut env = Self::new();
        env.set(SOURCE_DIRECTORY_VARIABLE, source_directory);
        env
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every `%NAME%` with the variable's value. Markers naming an
    /// unset variable are removed, as is a lone unterminated `%`.
    pub fn substitute(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find('%') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('%') else {
                rest = after;
                break;
            };
            let name = &after[..close];
            match self.get(name) {
                Some(value) => out.push_str(value),
                None => tracing::debug!("Unresolved variable %{name}%"),
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}
