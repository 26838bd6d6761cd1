use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use super::types::{GenerationParams, LanguageModel};
use super::LlmError;

/// Cloneable handle that serializes calls into one backend.
#[derive(Clone)]
pub struct SharedModel {
    inner: Arc<Mutex<Box<dyn LanguageModel>>>,
}

impl SharedModel {
    pub fn new(model: Box<dyn LanguageModel>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(model)),
        }
    }
}

impl LanguageModel for SharedModel {
    fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let model = self
            .inner
            .lock()
            .map_err(|_| LlmError::ModelUnavailable("model lock poisoned".into()))?;
        model.generate(prompt, system_prompt, params)
    }

    fn is_available(&self) -> bool {
        self.inner.lock().map(|m| m.is_available()).unwrap_or(false)
    }

    fn get_model_info(&self) -> Map<String, Value> {
        self.inner
            .lock()
            .map(|m| m.get_model_info())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::MockLanguageModel;

    #[test]
    fn clones_share_one_backend() {
        let shared = SharedModel::new(Box::new(MockLanguageModel::new(vec![
            "first".into(),
            "second".into(),
        ])));
        let other = shared.clone();

        let params = GenerationParams::default();
        assert_eq!(shared.generate("a", None, &params).unwrap(), "first");
        assert_eq!(other.generate("b", None, &params).unwrap(), "second");
        assert!(other.is_available());
        assert_eq!(other.get_model_info()["backend"], "mock");
    }

    #[test]
    fn concurrent_callers_are_serialized() {
        let shared = SharedModel::new(Box::new(MockLanguageModel::replying("{\"category\":\"Work\"}")));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let model = shared.clone();
                std::thread::spawn(move || model.extract_json("p", None).map(|m| m.len()))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 1);
        }
    }
}
