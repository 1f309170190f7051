//! Observability utilities.

mod tracing;

pub use tracing::{
    init_tracing, question_hash, AnswerSpanAttributes, SpanTimer, TracingFormat, DEFAULT_FILTER,
};
