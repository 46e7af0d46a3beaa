/// Answer models are told to give when the context does not cover the question.
pub const UNAVAILABLE_ANSWER: &str = "This information is not available in the provided documents";

const DEFAULT_PREAMBLE: &str =
    "You are a helpful AI assistant that answers questions based on provided documents.";

/// Builds the grounded generation request from a question and ranked context.
///
/// Context entries are numbered `[1]`, `[2]`, ... in the order given; the
/// assembler never re-sorts them. The orchestrator never calls [`build`]
/// with empty context.
///
/// [`build`]: PromptAssembler::build
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    preamble: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            preamble: DEFAULT_PREAMBLE.to_string(),
        }
    }
}

impl PromptAssembler {
    /// Assembler with the default preamble.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the opening role line.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Render the prompt for `question` over `context`, nearest first.
    pub fn build<S: AsRef<str>>(&self, question: &str, context: &[S]) -> String {
        let numbered = context
            .iter()
            .enumerate()
            .map(|(i, ctx)| format!("[{}] {}", i + 1, ctx.as_ref()))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "{preamble}\n\
             \n\
             PROVIDED DOCUMENTS:\n\
             {numbered}\n\
             \n\
             USER QUESTION: {question}\n\
             \n\
             INSTRUCTIONS:\n\
             1. Answer ONLY using information from the provided documents above\n\
             2. If the answer is not in the documents, clearly state \"{UNAVAILABLE_ANSWER}\"\n\
             3. Be clear, concise, and accurate\n\
             4. Cite which document section you used (e.g., \"According to [1]...\")\n\
             5. If multiple document sections support your answer, combine them coherently\n\
             \n\
             ANSWER:",
            preamble = self.preamble,
        )
    }
}
