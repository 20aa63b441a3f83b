//! Prompt construction for benchmark runs.
//!
//! A run prompt is a fixed template with two placeholders: a documentation
//! instruction block and the task description. The instruction depends on
//! how the documentation reaches the agent.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Placeholder replaced by the documentation instruction.
pub const DOC_INSTRUCTION_PLACEHOLDER: &str = "{DOC_INSTRUCTION}";
/// Placeholder replaced by the task description.
pub const TASK_PLACEHOLDER: &str = "{TASK}";

/// How the documentation is delivered to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocDelivery {
    /// No documentation; the agent relies on prior knowledge.
    None,
    /// The agent fetches the documentation from a URL.
    Remote { url: String },
    /// The documentation sits in the agent's workspace under this name.
    Local { file_name: String },
}

impl DocDelivery {
    /// The instruction block substituted into the template.
    pub fn instruction(&self) -> String {
        match self {
            DocDelivery::None => "No documentation is provided. Use your best knowledge of this API to complete the task.".to_string(),
            DocDelivery::Remote { url } => {
                format!("Fetch the API documentation from this URL: {}", url)
            }
            DocDelivery::Local { file_name } => format!(
                "The API documentation is available as a local file in your workspace: {}\nRead it using the Read tool.",
                file_name
            ),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            DocDelivery::None => "none",
            DocDelivery::Remote { .. } => "remote",
            DocDelivery::Local { .. } => "local",
        }
    }
}

/// Renders a prompt from template text.
pub fn build_prompt(template: &str, delivery: &DocDelivery, task_description: &str) -> String {
    template
        .replace(DOC_INSTRUCTION_PLACEHOLDER, &delivery.instruction())
        .replace(TASK_PLACEHOLDER, task_description)
}

/// A prompt template loaded once at startup.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Loads the template file. A missing template is a configuration error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { text })
    }

    pub fn render(&self, delivery: &DocDelivery, task_description: &str) -> String {
        build_prompt(&self.text, delivery, task_description)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEMPLATE: &str = "## Docs\n{DOC_INSTRUCTION}\n\n## Task\n{TASK}\n";

    #[test]
    fn test_no_doc_prompt() {
        let prompt = build_prompt(TEMPLATE, &DocDelivery::None, "Create a charge.");
        assert!(prompt.contains("No documentation is provided"));
        assert!(prompt.contains("## Task\nCreate a charge."));
        assert!(!prompt.contains("{TASK}"));
        assert!(!prompt.contains("{DOC_INSTRUCTION}"));
    }

    #[test]
    fn test_remote_prompt() {
        let delivery = DocDelivery::Remote {
            url: "https://raw.example.com/compiled/openapi/stripe/lean.lap".to_string(),
        };
        let prompt = build_prompt(TEMPLATE, &delivery, "Refund a charge.");
        assert!(prompt.contains(
            "Fetch the API documentation from this URL: https://raw.example.com/compiled/openapi/stripe/lean.lap"
        ));
    }

    #[test]
    fn test_local_prompt_names_only_the_file() {
        let delivery = DocDelivery::Local {
            file_name: "api_docs.txt".to_string(),
        };
        let prompt = build_prompt(TEMPLATE, &delivery, "List charges.");
        assert!(prompt.contains("local file in your workspace: api_docs.txt"));
        assert!(prompt.contains("Read it using the Read tool."));
    }

    #[test]
    fn test_missing_template_is_config_error() {
        let temp = TempDir::new().unwrap();
        let err = PromptTemplate::load(&temp.path().join("template.md")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile(_)));
    }

    #[test]
    fn test_load_and_render_template() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("template.md");
        fs::write(&path, TEMPLATE).unwrap();

        let template = PromptTemplate::load(&path).unwrap();
        let prompt = template.render(&DocDelivery::None, "Do it.");
        assert!(prompt.ends_with("Do it.\n"));
        assert_eq!(DocDelivery::None.mode(), "none");
    }
}
