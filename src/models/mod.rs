pub mod answer_key;
pub mod extraction;
pub mod fields;
pub mod grade;
pub mod progress;
pub mod run;

pub use answer_key::{
    AnswerKeyFile, CompanyAnswerKey, CompanyStatus, DocType, DocumentStatus, ExpectedLineItem,
    ExpectedPeriod,
};
pub use extraction::{parse_extraction, ExtractedField, ExtractedPeriod};
pub use grade::{FieldAccuracy, FieldComparison, FileGrade, GradeLevel, PeriodGrade};
pub use progress::{ProgressEvent, ProgressPhase};
pub use run::{RunRequest, RunStatus, TestHistory, TestRunResult, TestRunSummary};
