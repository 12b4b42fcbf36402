pub mod answer_key_store;
pub mod extractor;
pub mod field_grader;
pub mod llm_service;
pub mod period_aligner;
pub mod period_label;
pub mod run_scorer;

pub use answer_key_store::AnswerKeyStore;
pub use extractor::{ExtractionAdapter, ExtractionRequest, LlmExtractor};
pub use field_grader::GradingPolicy;
pub use llm_service::LlmService;
pub use period_aligner::{align_periods, AlignMethod, AlignedPeriod};
pub use run_scorer::{GradeThresholds, RunScorer};
