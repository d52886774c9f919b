//! Consent for creating remote entities.

/// Asks the operator a yes/no question.
pub trait Prompt: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

/// Answers every question the same way without asking.
#[derive(Debug, Clone, Copy)]
pub struct AutoResponse(pub bool);

impl Prompt for AutoResponse {
    fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}
