/// Errors surfaced to the debug client as failed responses. The connection
/// stays open; these are semantic misses, not protocol faults.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Thread {0} not found")]
    ThreadNotFound(i64),
    #[error("Frame {0} not found")]
    FrameNotFound(i64),
    #[error("VariablesReference {0} not found")]
    VariablesReferenceNotFound(i64),
    #[error("Source {0} not found")]
    SourceNotFound(i64),
    #[error("Could not evaluate expression")]
    CouldNotEvaluate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_the_wire_texts() {
        assert_eq!(Error::ThreadNotFound(9).to_string(), "Thread 9 not found");
        assert_eq!(
            Error::VariablesReferenceNotFound(3).to_string(),
            "VariablesReference 3 not found"
        );
        assert_eq!(
            Error::CouldNotEvaluate.to_string(),
            "Could not evaluate expression"
        );
    }
}
