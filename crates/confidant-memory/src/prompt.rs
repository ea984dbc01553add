//! Completion prompt assembly

use crate::records::Persona;
use crate::retrieval::RetrievedExcerpt;

/// Builds the completion prompt for one persona turn
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder<'a> {
    persona: &'a Persona,
    excerpts: &'a [RetrievedExcerpt],
    recent_history: &'a str,
}

impl<'a> PromptBuilder<'a> {
    /// Start a prompt for `persona`
    pub fn new(persona: &'a Persona) -> Self {
        Self {
            persona,
            excerpts: &[],
            recent_history: "",
        }
    }

    /// Relevant backstory excerpts, most similar first
    pub fn with_excerpts(mut self, excerpts: &'a [RetrievedExcerpt]) -> Self {
        self.excerpts = excerpts;
        self
    }

    /// Recent dialogue, oldest line first
    pub fn with_recent_history(mut self, recent_history: &'a str) -> Self {
        self.recent_history = recent_history;
        self
    }

    /// Excerpt block, one excerpt per line
    pub fn relevant_details(&self) -> String {
        self.excerpts
            .iter()
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render the prompt. The model is asked to continue after the persona's
    /// speaker label without repeating it.
    pub fn build(&self) -> String {
        let name = &self.persona.name;
        format!(
            "ONLY generate plain sentences without prefix of who is speaking. DO NOT use {name}: prefix.\n\
             \n\
             {instructions}\n\
             \n\
             Below are relevant details about {name}'s past and the conversation you are in.\n\
             {relevant}\n\
             \n\
             \n\
             {recent}\n\
             {name}:",
            name = name,
            instructions = self.persona.instructions.trim(),
            relevant = self.relevant_details(),
            recent = self.recent_history,
        )
    }
}
