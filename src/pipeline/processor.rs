//! Per-file classification pipeline and batch driver.
//!
//! registry → parser → excerpt → constrained prompt → `extract_json` →
//! record → destination path. Files are never moved here; callers receive
//! the proposed relative path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::pipeline::extraction::{truncate_summary, DegradeReason, ExtractionError, ParserRegistry};
use crate::pipeline::rules::{generate_target_path, parse_rule_string, RuleSpec};
use crate::pipeline::structuring::{
    build_classification_prompt, build_dynamic_prompt, ClassificationRecord, LanguageModel, LlmError,
};

/// Default excerpt length sent to the model.
pub const DEFAULT_SUMMARY_LENGTH: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Classification failed: {0}")]
    Llm(#[from] LlmError),
}

/// Result for one classified file.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationOutcome {
    pub source: PathBuf,
    pub record: ClassificationRecord,
    /// Destination folder relative to the caller's output root.
    pub target_dir: PathBuf,
    /// Set when only the file name could be sent to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<DegradeReason>,
}

impl ClassificationOutcome {
    /// `target_dir` joined with the source file name.
    pub fn target_path(&self) -> PathBuf {
        match self.source.file_name() {
            Some(name) => self.target_dir.join(name),
            None => self.target_dir.clone(),
        }
    }
}

/// Outcome of a batch run. Failures do not stop the batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ClassificationOutcome>,
    pub failures: Vec<(PathBuf, PipelineError)>,
    /// The cancel flag was observed before every file was processed.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }
}

/// Classifies files against one parsed rule chain.
pub struct Classifier<'a> {
    registry: &'a ParserRegistry,
    model: &'a dyn LanguageModel,
    rules: Vec<RuleSpec>,
    system_prompt: String,
    summary_max_length: usize,
}

impl<'a> Classifier<'a> {
    pub fn new(registry: &'a ParserRegistry, model: &'a dyn LanguageModel, instruction: &str) -> Self {
        let rules = parse_rule_string(instruction);
        let system_prompt = build_dynamic_prompt(&rules);
        tracing::debug!(
            rules = rules.len(),
            constrained = rules.iter().filter(|r| r.is_constrained()).count(),
            "Rule chain parsed"
        );
        Self {
            registry,
            model,
            rules,
            system_prompt,
            summary_max_length: DEFAULT_SUMMARY_LENGTH,
        }
    }

    pub fn with_summary_length(mut self, max_length: usize) -> Self {
        self.summary_max_length = max_length;
        self
    }

    pub fn rules(&self) -> &[RuleSpec] {
        &self.rules
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn classify_file(&self, path: &Path) -> Result<ClassificationOutcome, PipelineError> {
        let _span = tracing::info_span!("classify_file", file = %path.display()).entered();
        let start = std::time::Instant::now();

        let parser = self.registry.get_parser(path)?;
        let info = parser.get_file_info()?;

        let extracted = parser.extract_text();
        let degraded = extracted.degrade_reason().cloned();
        let excerpt = if degraded.is_some() {
            String::new()
        } else {
            truncate_summary(extracted.text(), self.summary_max_length)
        };

        let prompt = build_classification_prompt(&info.name, &excerpt);
        let response = self.model.extract_json(&prompt, Some(&self.system_prompt))?;

        let mut record = ClassificationRecord::from_json(response);
        record.fill_original_name(&info.stem);
        let target_dir = generate_target_path(&self.rules, &record);

        tracing::info!(
            parser = parser.label(),
            degraded = degraded.is_some(),
            excerpt_chars = excerpt.chars().count(),
            target = %target_dir.display(),
            elapsed_ms = %start.elapsed().as_millis(),
            "File classified"
        );

        Ok(ClassificationOutcome {
            source: info.path,
            record,
            target_dir,
            degraded,
        })
    }

    /// Classify `paths` in order, checking `cancel` before each file.
    pub fn classify_batch(&self, paths: &[PathBuf], cancel: &AtomicBool) -> BatchReport {
        let mut report = BatchReport::default();

        for path in paths {
            if cancel.load(Ordering::Relaxed) {
                tracing::info!(
                    processed = report.processed(),
                    remaining = paths.len() - report.processed(),
                    "Batch cancelled"
                );
                report.cancelled = true;
                break;
            }

            match self.classify_file(path) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "File skipped");
                    report.failures.push((path.clone(), e));
                }
            }
        }

        tracing::info!(
            classified = report.outcomes.len(),
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "Batch complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::ExtractionContext;
    use crate::pipeline::structuring::MockLanguageModel;
    use std::sync::Arc;

    fn registry() -> ParserRegistry {
        ParserRegistry::with_defaults(Arc::new(ExtractionContext::text_only()))
    }

    const REPLY: &str = r#"{"category": "Finance", "year": "2024", "month": "03", "summary": "Invoice for March"}"#;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn classifies_text_file_into_rule_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "invoice_march.txt", b"Invoice 2024-03 total due 120 EUR");
        let registry = registry();
        let model = MockLanguageModel::replying(REPLY);

        let classifier = Classifier::new(&registry, &model, "类型 [Finance, Work] >> 年份 >> 月份");
        let outcome = classifier.classify_file(&path).unwrap();

        assert_eq!(outcome.target_dir, PathBuf::from("Finance").join("2024").join("03"));
        assert_eq!(outcome.record.get("original_name"), Some("invoice_march"));
        assert!(outcome.degraded.is_none());
        assert!(outcome.target_path().ends_with("Finance/2024/03/invoice_march.txt"));

        let call = &model.calls()[0];
        assert!(call.prompt.contains("invoice_march.txt"));
        assert!(call.prompt.contains("total due 120 EUR"));
        let system = call.system.as_deref().unwrap();
        assert!(system.contains("MUST be exactly one of: Finance, Work"));
    }

    #[test]
    fn excerpt_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "long.md", "word ".repeat(400).as_bytes());
        let registry = registry();
        let model = MockLanguageModel::replying(REPLY);

        Classifier::new(&registry, &model, "Category")
            .with_summary_length(20)
            .classify_file(&path)
            .unwrap();

        let prompt = &model.calls()[0].prompt;
        assert!(prompt.contains(&format!("{}...", &"word ".repeat(4))));
        assert!(!prompt.contains(&"word ".repeat(5)));
    }

    #[test]
    fn degraded_extraction_sends_only_the_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "old_contract.doc", b"\xD0\xCF\x11\xE0 legacy");
        let registry = registry();
        let model = MockLanguageModel::replying(r#"{"category": "Contract"}"#);

        let outcome = Classifier::new(&registry, &model, "Category >> Year")
            .classify_file(&path)
            .unwrap();

        assert!(matches!(outcome.degraded, Some(DegradeReason::ExtractionFailure(_))));
        assert_eq!(outcome.target_dir, PathBuf::from("Contract").join("Unknown"));
        assert!(!model.calls()[0].prompt.contains("<content>"));
    }

    #[test]
    fn unsupported_and_missing_files_are_extraction_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let model = MockLanguageModel::replying(REPLY);
        let classifier = Classifier::new(&registry, &model, "Category");

        let image = write(dir.path(), "photo.png", b"\x89PNG");
        assert!(matches!(
            classifier.classify_file(&image),
            Err(PipelineError::Extraction(ExtractionError::UnsupportedFormat(_)))
        ));
        assert!(matches!(
            classifier.classify_file(&dir.path().join("gone.txt")),
            Err(PipelineError::Extraction(ExtractionError::FileNotFound(_)))
        ));
        assert!(model.calls().is_empty());
    }

    #[test]
    fn invalid_model_reply_is_llm_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.txt", b"hello");
        let registry = registry();
        let model = MockLanguageModel::replying("I am not sure.");

        let err = Classifier::new(&registry, &model, "Category")
            .classify_file(&path)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Llm(LlmError::InvalidModelResponse(_))));
    }

    #[test]
    fn batch_records_failures_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            write(dir.path(), "a.txt", b"alpha"),
            dir.path().join("missing.txt"),
            write(dir.path(), "b.csv", b"x,y\n1,2\n"),
        ];
        let registry = registry();
        let model = MockLanguageModel::replying(REPLY);

        let report = Classifier::new(&registry, &model, "Category")
            .classify_batch(&paths, &AtomicBool::new(false));

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, paths[1]);
        assert!(!report.cancelled);
    }

    #[test]
    fn batch_stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![write(dir.path(), "a.txt", b"alpha")];
        let registry = registry();
        let model = MockLanguageModel::replying(REPLY);
        let cancel = Arc::new(AtomicBool::new(true));

        let report = Classifier::new(&registry, &model, "Category").classify_batch(&paths, &cancel);

        assert!(report.cancelled);
        assert_eq!(report.processed(), 0);
        assert!(model.calls().is_empty());
    }
}
