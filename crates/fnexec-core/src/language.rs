//! Supported function languages and their runtime conventions.

use crate::errors::ExecutionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Python, Language::Javascript];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
        }
    }

    pub fn default_image(&self) -> &'static str {
        match self {
            Language::Python => "python-base",
            Language::Javascript => "nodejs-base",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Javascript => "js",
        }
    }

    pub fn interpreter(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "node",
        }
    }

    /// File name the code is delivered under inside a unit.
    pub fn entry_file_name(&self) -> String {
        format!("user_function.{}", self.suffix())
    }

    /// Interpreter invocation against the entry file in `working_dir`.
    pub fn command(&self, working_dir: &str) -> Vec<String> {
        vec![
            self.interpreter().to_string(),
            format!("{}/{}", working_dir.trim_end_matches('/'), self.entry_file_name()),
        ]
    }

    /// Infer a language from a source file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" => Some(Language::Python),
            "js" | "mjs" | "cjs" => Some(Language::Javascript),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "python3" => Ok(Language::Python),
            "javascript" | "js" | "node" | "nodejs" => Ok(Language::Javascript),
            other => Err(ExecutionError::UnsupportedLanguage(other.to_string())),
        }
    }
}
