//! Interactive confirmations.

use dialoguer::{theme::ColorfulTheme, Confirm};
use std::sync::Arc;

use tmsync_core::{AutoResponse, Prompt};

/// Asks on the terminal; anything but an explicit yes is a no.
pub struct TerminalPrompt {
    theme: ColorfulTheme,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, question: &str) -> bool {
        Confirm::with_theme(&self.theme)
            .with_prompt(question)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

/// The prompt for a configured answer: fixed when one is set, interactive otherwise.
pub fn prompt_for(auto_response: Option<bool>) -> Arc<dyn Prompt> {
    match auto_response {
        Some(answer) => Arc::new(AutoResponse(answer)),
        None => Arc::new(TerminalPrompt::new()),
    }
}
