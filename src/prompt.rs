//! Prompt templates for interview turns, greetings and final evaluation.

use crate::compression::RetrievedPiece;
use crate::memory::Turn;
use crate::role::JobRole;

/// Delimiter placed between retrieved passages in the context slot.
pub const CONTEXT_DELIMITER: &str = "\n\n";

/// Values substituted into the interview template.
#[derive(Debug, Clone, Copy)]
pub struct PromptSlots<'a> {
    /// Effective job role.
    pub job_role: &'a JobRole,
    /// Rendered retrieved context.
    pub context: &'a str,
    /// Rendered transcript.
    pub chat_history: &'a str,
    /// New candidate input.
    pub question: &'a str,
}

/// Fills the fixed interviewer templates.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    response_language: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new("English")
    }
}

impl PromptComposer {
    /// Composer answering in `response_language`.
    pub fn new(response_language: impl Into<String>) -> Self {
        Self {
            response_language: response_language.into(),
        }
    }

    /// Interview turn prompt.
    pub fn compose(&self, slots: &PromptSlots<'_>) -> String {
        format!(
            "You are an AI interviewer helping users prepare for interviews.
Use the user's resume and chat context. Greet the user and ask for a self-introduction before asking technical questions.
Ask technical questions one at a time and, after the user answers, respond with a follow-up question.
Detected Job Role: {job_role}

Use ONLY:
Context from documents / resume:
{context}

Chat History:
{chat_history}
Do not repeat a question already asked in the chat history, even if it was not answered.

User Question (if any):
{question}

Guidelines:
- Provide hints only if requested
- Do not repeat any previously asked questions from chat history
- Ask follow-up questions instead
- Respond in {language}, concise and conversational
- If the response is empty, give the answer and ask another question
- If the user gives a vague answer, start with a clarifying question to check their understanding

Final Answer:
",
            job_role = slots.job_role,
            context = slots.context,
            chat_history = slots.chat_history,
            question = slots.question,
            language = self.response_language,
        )
    }

    /// One-shot evaluation prompt sent when the interview ends.
    pub fn evaluation_prompt(&self, chat_history: &str, job_role: &JobRole) -> String {
        format!(
            "You are an interview evaluator.

Candidate chat history:
{chat_history}

Job Role: {job_role}

Provide a final review including:
1. Scores (clarity, correctness, confidence)
2. Strengths
3. Weaknesses
4. Actionable improvement tips
Respond concisely in {language} and do not ask new questions.
",
            language = self.response_language,
        )
    }

    /// Rewrites a follow-up into a standalone question for retrieval.
    pub fn condense_prompt(&self, chat_history: &str, question: &str) -> String {
        format!(
            "Given the following conversation and a follow up input, rephrase the follow up input to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:"
        )
    }
}

/// Question used to open an interview for `job_role`.
pub fn greeting_question(job_role: &JobRole) -> String {
    format!("Give a friendly greeting for a user preparing for a {job_role} interview.")
}

/// Joins passages in their final order.
pub fn render_context(pieces: &[RetrievedPiece]) -> String {
    pieces
        .iter()
        .map(|piece| piece.text.trim())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Renders turns as role-labelled lines.
pub fn render_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}
