/// Outcome of a grounded question-answering call.
///
/// `sources` holds deduplicated document titles in sorted order; it is empty
/// when the backend produced no grounding metadata (including the fallback
/// and error paths).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<String>,
}

impl QueryResult {
    pub fn ungrounded(answer: impl Into<String>) -> Self {
        Self { answer: answer.into(), sources: Vec::new() }
    }
}
