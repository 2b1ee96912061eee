//! Natural-language schema suggestion
//!
//! A suggester turns a description ("a volunteer signup with t-shirt size")
//! into field descriptors. Whatever comes back is validated with the same
//! rules as `create_form`; nothing here touches the database.

mod ollama;

pub use ollama::*;

use crate::config::SuggestConfig;
use crate::error::{Error, Result};
use crate::forms::fields::{parse_field_descriptors, validate_fields, FieldDescriptor, FieldType};
use async_trait::async_trait;

#[async_trait]
pub trait SchemaSuggester: Send + Sync {
    async fn suggest(&self, description: &str) -> Result<Vec<FieldDescriptor>>;
    fn model_name(&self) -> &str;
}

pub fn create_suggester(config: &SuggestConfig) -> Result<Box<dyn SchemaSuggester>> {
    if !config.enabled {
        return Err(Error::Config(
            "Schema suggestion is disabled; set suggest.enabled = true".to_string(),
        ));
    }
    Ok(Box::new(OllamaSuggester::new(config)?))
}

/// Instruction sent ahead of the user's description
pub fn build_prompt(description: &str) -> String {
    let types: Vec<&str> = FieldType::ALL.iter().map(|t| t.as_str()).collect();
    format!(
        "You design data-entry forms. Reply with only a JSON array of fields, \
         each an object {{\"name\": string, \"type\": string, \"options\": [string]}}. \
         Allowed types: {}. Choice types (SELECT, MULTISELECT, CHECKBOX_GROUP) must \
         include a non-empty \"options\" list; other types omit it. Field names must be unique.\n\n\
         Form description: {}",
        types.join(", "),
        description.trim()
    )
}

/// Pull a field list out of free-form model output and validate it
pub fn parse_suggestion(text: &str) -> Result<Vec<FieldDescriptor>> {
    let start = text.find('[');
    let end = text.rfind(']');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(Error::Suggest(
                "Response did not contain a field list".to_string(),
            ))
        }
    };

    let fields = parse_field_descriptors(json).map_err(|e| Error::Suggest(e.to_string()))?;
    validate_fields(&fields).map_err(|e| Error::Suggest(e.to_string()))?;
    Ok(fields)
}
