use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A single preprocessor macro definition.
///
/// A `hidden` macro is an `#undef` marker: it shadows earlier definitions of
/// the same name in the [`crate::Environment`] and resolves as "not defined".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    name: String,
    definition: String,
    parameters: Vec<String>,
    function_like: bool,
    hidden: bool,
    file: PathBuf,
    line: u32,
    file_revision: u32,
}

impl Macro {
    pub fn object(
        name: impl Into<String>,
        definition: impl Into<String>,
        file: impl Into<PathBuf>,
        line: u32,
    ) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            parameters: Vec::new(),
            function_like: false,
            hidden: false,
            file: file.into(),
            line,
            file_revision: 0,
        }
    }

    pub fn function(
        name: impl Into<String>,
        parameters: Vec<String>,
        definition: impl Into<String>,
        file: impl Into<PathBuf>,
        line: u32,
    ) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            parameters,
            function_like: true,
            hidden: false,
            file: file.into(),
            line,
            file_revision: 0,
        }
    }

    /// An `#undef` marker for `name`.
    pub fn undef(name: impl Into<String>, file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            name: name.into(),
            definition: String::new(),
            parameters: Vec::new(),
            function_like: false,
            hidden: true,
            file: file.into(),
            line,
            file_revision: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The replacement text of the definition.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn is_function_like(&self) -> bool {
        self.function_like
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn file_revision(&self) -> u32 {
        self.file_revision
    }

    pub fn with_file_revision(mut self, revision: u32) -> Self {
        self.file_revision = revision;
        self
    }

    /// The definition as it would be spelled after `#define `, including the
    /// parameter list for function-like macros.
    pub fn definition_text(&self) -> String {
        let mut out = String::with_capacity(self.name.len() + self.definition.len() + 4);
        out.push_str(&self.name);
        if self.function_like {
            out.push('(');
            out.push_str(&self.parameters.join(", "));
            out.push(')');
        }
        if !self.definition.is_empty() {
            out.push(' ');
            out.push_str(&self.definition);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_text_spells_the_define_body() {
        let object = Macro::object("N", "1", "/p/a.h", 3);
        assert_eq!(object.definition_text(), "N 1");

        let function = Macro::function(
            "MAX",
            vec!["a".to_string(), "b".to_string()],
            "((a) > (b) ? (a) : (b))",
            "/p/a.h",
            4,
        );
        assert_eq!(function.definition_text(), "MAX(a, b) ((a) > (b) ? (a) : (b))");
    }
}
