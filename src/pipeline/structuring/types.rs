use serde::{Deserialize, Serialize};

use super::ollama_types::OllamaError;
use super::parser::{extract_json_object, pick_option};
use super::LlmError;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 512,
            top_p: 0.95,
            stop: Vec::new(),
        }
    }
}

impl GenerationParams {
    /// Short, near-deterministic answer for multiple-choice prompts.
    pub fn classification() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 50,
            ..Self::default()
        }
    }

    pub fn json_extraction() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 512,
            ..Self::default()
        }
    }
}

/// A generative text backend.
///
/// Implementors provide `generate`; `classify` and `extract_json` are built
/// on top of it. Each call is one optional system message plus one user
/// message with no conversation state.
pub trait LanguageModel: Send {
    fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        params: &GenerationParams,
    ) -> Result<String, LlmError>;

    /// Pick one of `options` for `text`. Returns the first option (in list
    /// order) found in the response, or `options[0]` when none is.
    fn classify(
        &self,
        text: &str,
        options: &[String],
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        if options.is_empty() {
            return Err(LlmError::InvalidArgument(
                "classify requires at least one option".into(),
            ));
        }

        let prompt = format!(
            "Classify the following text into exactly one of these categories: {}\n\n\
             Text: {text}\n\n\
             Respond with exactly one option and nothing else.\n\n\
             Category:",
            options.join(", ")
        );
        let response = self.generate(&prompt, system_prompt, &GenerationParams::classification())?;
        Ok(pick_option(&response, options).to_string())
    }

    /// Generate and decode a single JSON object from the response.
    fn extract_json(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<serde_json::Map<String, serde_json::Value>, LlmError> {
        let json_prompt = format!(
            "{prompt}\n\n\
             Respond with valid JSON only. Do not add any explanation or text outside the JSON object.\n\n\
             JSON:"
        );
        let response =
            self.generate(&json_prompt, system_prompt, &GenerationParams::json_extraction())?;
        extract_json_object(&response)
    }

    fn is_available(&self) -> bool {
        true
    }

    fn get_model_info(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }
}

/// Vision chat used for OCR: images travel base64-encoded on the user message.
pub trait VisionClient: Send + Sync {
    fn chat_with_images(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, OllamaError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::MockLanguageModel;

    fn options(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_params() {
        let p = GenerationParams::default();
        assert_eq!((p.temperature, p.max_tokens, p.top_p), (0.7, 512, 0.95));
        let c = GenerationParams::classification();
        assert_eq!((c.temperature, c.max_tokens), (0.3, 50));
        let j = GenerationParams::json_extraction();
        assert_eq!((j.temperature, j.max_tokens), (0.3, 512));
    }

    #[test]
    fn classify_matches_option_case_insensitively() {
        let model = MockLanguageModel::new(vec!["  the answer is INVOICE.  ".into()]);
        let picked = model
            .classify("total due", &options(&["Contract", "Invoice"]), None)
            .unwrap();
        assert_eq!(picked, "Invoice");

        let call = &model.calls()[0];
        assert_eq!(call.params, GenerationParams::classification());
        assert!(call.prompt.contains("Contract, Invoice"));
        assert!(call.prompt.contains("Text: total due"));
    }

    #[test]
    fn classify_uses_list_order_on_ties() {
        let model = MockLanguageModel::new(vec!["Invoice or Contract".into()]);
        let picked = model
            .classify("x", &options(&["Contract", "Invoice"]), None)
            .unwrap();
        assert_eq!(picked, "Contract");
    }

    #[test]
    fn classify_defaults_to_first_option() {
        let model = MockLanguageModel::new(vec!["no idea".into()]);
        let picked = model.classify("x", &options(&["Work", "Personal"]), None).unwrap();
        assert_eq!(picked, "Work");
    }

    #[test]
    fn classify_rejects_empty_options_without_calling_backend() {
        let model = MockLanguageModel::new(vec!["Work".into()]);
        let err = model.classify("x", &[], None).unwrap_err();
        assert!(matches!(err, LlmError::InvalidArgument(_)));
        assert!(model.calls().is_empty());
    }

    #[test]
    fn extract_json_appends_instruction_and_passes_system_prompt() {
        let model = MockLanguageModel::new(vec![
            "Sure! {\"category\": \"Work\", \"year\": \"2024\"} hope this helps".into(),
        ]);
        let map = model.extract_json("file: notes.txt", Some("SYS")).unwrap();
        assert_eq!(map["category"], "Work");

        let call = &model.calls()[0];
        assert!(call.prompt.starts_with("file: notes.txt\n\n"));
        assert!(call.prompt.ends_with("JSON:"));
        assert_eq!(call.system.as_deref(), Some("SYS"));
        assert_eq!(call.params, GenerationParams::json_extraction());
    }

    #[test]
    fn extract_json_without_object_is_invalid_response() {
        let model = MockLanguageModel::new(vec!["I cannot help with that".into()]);
        assert!(matches!(
            model.extract_json("p", None),
            Err(LlmError::InvalidModelResponse(_))
        ));
    }

    #[test]
    fn generation_errors_propagate() {
        let model = MockLanguageModel::unavailable();
        assert!(matches!(
            model.extract_json("p", None),
            Err(LlmError::ModelUnavailable(_))
        ));
        assert!(!model.is_available());
    }
}
