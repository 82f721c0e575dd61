//! Per-turn conversation flow: retrieval, prompt composition, model call and
//! memory bookkeeping.

use std::sync::Arc;

use serde::Serialize;

use crate::compression::{ContextRetriever, RetrievedPiece};
use crate::error::{AppError, AppResult};
use crate::llm::{CompletionRequest, LlmProvider};
use crate::memory::{SessionStore, Turn};
use crate::prompt::{greeting_question, render_context, render_history, PromptComposer, PromptSlots};
use crate::resume::ResumeAnalysis;
use crate::role::JobRole;

/// Model call parameters and optional behaviours.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Sampling temperature for every model call.
    pub temperature: f32,
    /// Token cap for every model call.
    pub max_tokens: usize,
    /// Rewrite follow-ups into standalone questions before retrieval.
    pub condense_questions: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            condense_questions: false,
        }
    }
}

/// Passage that contributed to an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    /// Originating document.
    pub source_id: String,
    /// Chunk position within the document.
    pub sequence_index: usize,
    /// Relevance estimate used for ranking.
    pub score: f32,
}

impl From<&RetrievedPiece> for SourceRef {
    fn from(piece: &RetrievedPiece) -> Self {
        Self {
            source_id: piece.source_id.clone(),
            sequence_index: piece.sequence_index,
            score: piece.relevance(),
        }
    }
}

/// Result of one interview turn.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Interviewer reply.
    pub answer: String,
    /// Role the turn was conducted for.
    pub job_role: JobRole,
    /// Passages placed in the prompt, in prompt order.
    pub sources: Vec<SourceRef>,
}

/// Opening line of an interview.
#[derive(Debug, Clone, Serialize)]
pub struct Greeting {
    /// Greeting text.
    pub text: String,
    /// Role the interview is tailored to.
    pub job_role: JobRole,
}

/// Drives interview sessions.
pub struct InterviewAgent {
    retriever: Arc<dyn ContextRetriever>,
    llm: Arc<dyn LlmProvider>,
    composer: PromptComposer,
    sessions: Arc<SessionStore>,
    settings: AgentSettings,
}

impl InterviewAgent {
    /// Wires the pipeline pieces together.
    pub fn new(
        retriever: Arc<dyn ContextRetriever>,
        llm: Arc<dyn LlmProvider>,
        composer: PromptComposer,
        sessions: Arc<SessionStore>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            retriever,
            llm,
            composer,
            sessions,
            settings,
        }
    }

    /// Session arena backing this agent.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Runs one turn. Memory is only updated when the whole turn succeeds.
    pub async fn ask(
        &self,
        session_id: &str,
        question: &str,
        role_override: Option<&str>,
    ) -> AppResult<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidRequest("query must not be empty".into()));
        }
        let memory = self.sessions.get_or_create(session_id).await?;
        // held for the whole turn so turns within one session never interleave
        let mut memory = memory.lock().await;

        let job_role = memory.resolve_job_role(role_override);
        let chat_history = render_history(memory.all());
        let search_query = if self.settings.condense_questions && !memory.is_empty() {
            self.condense(&chat_history, question).await?
        } else {
            question.to_string()
        };

        let pieces = self.retriever.retrieve(&search_query).await?;
        let context = render_context(&pieces);
        let prompt = self.composer.compose(&PromptSlots {
            job_role: &job_role,
            context: &context,
            chat_history: &chat_history,
            question,
        });
        let answer = self.complete(&prompt).await?;

        memory.append(Turn::user(question));
        memory.append(Turn::assistant(answer.clone()));
        tracing::info!(
            session = session_id,
            role = %job_role,
            passages = pieces.len(),
            turns = memory.all().len(),
            "answered interview turn"
        );
        Ok(Answer {
            answer,
            job_role,
            sources: pieces.iter().map(SourceRef::from).collect(),
        })
    }

    /// Opens the interview with a greeting for the effective role.
    pub async fn greet(&self, session_id: &str, role_override: Option<&str>) -> AppResult<Greeting> {
        let job_role = self
            .sessions
            .get_or_create(session_id)
            .await?
            .lock()
            .await
            .resolve_job_role(role_override);
        let answer = self
            .ask(session_id, &greeting_question(&job_role), Some(job_role.as_str()))
            .await?;
        Ok(Greeting {
            text: answer.answer,
            job_role: answer.job_role,
        })
    }

    /// Produces the final evaluation and clears the session once it succeeds.
    pub async fn end(&self, session_id: &str) -> AppResult<String> {
        let memory = self.sessions.get_or_create(session_id).await?;
        let mut memory = memory.lock().await;
        let job_role = memory.resolve_job_role(None);
        let prompt = self
            .composer
            .evaluation_prompt(&render_history(memory.all()), &job_role);
        let feedback = self.complete(&prompt).await?;
        let turns = memory.all().len();
        memory.clear();
        tracing::info!(session = session_id, turns, "interview ended");
        Ok(feedback)
    }

    /// Drops the session's transcript and facts.
    pub async fn reset(&self, session_id: &str) -> AppResult<()> {
        self.sessions
            .get_or_create(session_id)
            .await?
            .lock()
            .await
            .clear();
        tracing::info!(session = session_id, "memory cleared");
        Ok(())
    }

    /// Stores resume-derived facts in the session.
    pub async fn record_resume(&self, session_id: &str, analysis: &ResumeAnalysis) -> AppResult<()> {
        let memory = self.sessions.get_or_create(session_id).await?;
        let mut memory = memory.lock().await;
        memory.record_job_role(analysis.job_role.clone());
        memory.record_resume_keywords(analysis.keywords.clone());
        Ok(())
    }

    async fn condense(&self, chat_history: &str, question: &str) -> AppResult<String> {
        let prompt = self.composer.condense_prompt(chat_history, question);
        let standalone = self.complete(&prompt).await?;
        tracing::debug!(original = question, standalone = %standalone, "condensed question");
        Ok(standalone)
    }

    async fn complete(&self, prompt: &str) -> AppResult<String> {
        let request = CompletionRequest {
            prompt,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let answer = self
            .llm
            .complete(&request)
            .await
            .map_err(AppError::model)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(AppError::Model(format!(
                "{} returned an empty answer",
                self.llm.name()
            )));
        }
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::{TurnRole, DEFAULT_SESSION};
    use crate::testing::{FailingLlm, ScriptedLlm, StaticRetriever};
    use pretty_assertions::assert_eq;

    fn agent_with(
        retriever: Arc<dyn ContextRetriever>,
        llm: Arc<dyn LlmProvider>,
        settings: AgentSettings,
    ) -> InterviewAgent {
        InterviewAgent::new(
            retriever,
            llm,
            PromptComposer::default(),
            Arc::new(SessionStore::new(16, Duration::from_secs(600))),
            settings,
        )
    }

    async fn transcript(agent: &InterviewAgent, session: &str) -> Vec<Turn> {
        agent
            .sessions()
            .get_or_create(session)
            .await
            .unwrap()
            .lock()
            .await
            .all()
            .to_vec()
    }

    #[tokio::test]
    async fn ask_builds_prompt_and_records_both_turns() {
        let llm = ScriptedLlm::always("Tell me about ownership in Rust.");
        let agent = agent_with(
            StaticRetriever::new(&["Rust ownership moves values.", "Borrowing rules."]),
            llm.clone(),
            AgentSettings::default(),
        );

        let answer = agent.ask(DEFAULT_SESSION, "  hello  ", None).await.unwrap();
        assert_eq!(answer.answer, "Tell me about ownership in Rust.");
        assert_eq!(answer.job_role, JobRole::General);
        assert_eq!(answer.sources.len(), 2);

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Rust ownership moves values.\n\nBorrowing rules."));
        assert!(prompt.contains("Detected Job Role: General"));
        assert!(prompt.contains("User Question (if any):\nhello"));

        let turns = transcript(&agent, DEFAULT_SESSION).await;
        assert_eq!(
            turns,
            vec![
                Turn::user("hello"),
                Turn::assistant("Tell me about ownership in Rust.")
            ]
        );
    }

    #[tokio::test]
    async fn history_from_earlier_turns_reaches_the_prompt() {
        let llm = ScriptedLlm::queued(&["Introduce yourself.", "What is a trait?"], "ok");
        let agent = agent_with(StaticRetriever::new(&[]), llm.clone(), AgentSettings::default());
        agent.ask("s1", "hi", None).await.unwrap();
        agent.ask("s1", "I write Rust", None).await.unwrap();

        let prompts = llm.prompts();
        assert!(prompts[1].contains("User: hi\nAssistant: Introduce yourself."));
    }

    #[tokio::test]
    async fn failed_model_call_leaves_memory_untouched() {
        let agent = agent_with(
            StaticRetriever::new(&["context"]),
            Arc::new(FailingLlm),
            AgentSettings::default(),
        );
        let err = agent.ask("s1", "hello", None).await.unwrap_err();
        assert_eq!(err.kind(), "model");
        assert!(transcript(&agent, "s1").await.is_empty());
    }

    #[tokio::test]
    async fn failed_retrieval_leaves_memory_untouched() {
        let llm = ScriptedLlm::always("unused");
        let agent = agent_with(StaticRetriever::failing(), llm.clone(), AgentSettings::default());
        let err = agent.ask("s1", "hello", None).await.unwrap_err();
        assert_eq!(err.kind(), "retrieval");
        assert!(llm.prompts().is_empty());
        assert!(transcript(&agent, "s1").await.is_empty());
    }

    #[tokio::test]
    async fn empty_question_and_empty_answer_are_rejected() {
        let agent = agent_with(
            StaticRetriever::new(&[]),
            ScriptedLlm::always("   "),
            AgentSettings::default(),
        );
        assert_eq!(
            agent.ask("s1", " \n", None).await.unwrap_err().kind(),
            "invalid_request"
        );
        assert_eq!(agent.ask("s1", "hi", None).await.unwrap_err().kind(), "model");
        assert!(transcript(&agent, "s1").await.is_empty());
    }

    #[tokio::test]
    async fn resume_role_drives_later_turns_until_overridden() {
        let llm = ScriptedLlm::always("Next question.");
        let agent = agent_with(StaticRetriever::new(&[]), llm.clone(), AgentSettings::default());
        let analysis = ResumeAnalysis {
            job_role: JobRole::SalesExecutive,
            keywords: vec!["crm".into(), "quota".into()],
            text: "Sales lead with CRM experience".into(),
        };
        agent.record_resume("s1", &analysis).await.unwrap();

        let turns = transcript(&agent, "s1").await;
        assert_eq!(turns[0].role, TurnRole::System);
        assert_eq!(turns[0].content, "DETECTED_JOB_ROLE: Sales Executive");
        assert_eq!(turns[1].content, "RESUME_KEYWORDS: crm, quota");

        let answer = agent.ask("s1", "ready", None).await.unwrap();
        assert_eq!(answer.job_role, JobRole::SalesExecutive);
        assert!(llm.prompts()[0].contains("RESUME_KEYWORDS: crm, quota"));

        let answer = agent
            .ask("s1", "ready", Some("Software Engineer"))
            .await
            .unwrap();
        assert_eq!(answer.job_role, JobRole::SoftwareEngineer);
    }

    #[tokio::test]
    async fn greet_asks_for_a_role_specific_greeting() {
        let llm = ScriptedLlm::always("Welcome! Please introduce yourself.");
        let agent = agent_with(StaticRetriever::new(&[]), llm.clone(), AgentSettings::default());
        let greeting = agent.greet("s1", Some("Sales Executive")).await.unwrap();
        assert_eq!(greeting.text, "Welcome! Please introduce yourself.");
        assert_eq!(greeting.job_role, JobRole::SalesExecutive);
        assert!(llm.prompts()[0]
            .contains("Give a friendly greeting for a user preparing for a Sales Executive interview."));
    }

    #[tokio::test]
    async fn end_evaluates_without_retrieval_and_clears() {
        let llm = ScriptedLlm::queued(&["Q1", "Clarity 4/5"], "unused");
        let agent = agent_with(StaticRetriever::new(&["ctx"]), llm.clone(), AgentSettings::default());
        agent.ask("s1", "my answer", None).await.unwrap();

        let feedback = agent.end("s1").await.unwrap();
        assert_eq!(feedback, "Clarity 4/5");
        let prompt = &llm.prompts()[1];
        assert!(prompt.contains("You are an interview evaluator."));
        assert!(prompt.contains("User: my answer\nAssistant: Q1"));
        assert!(!prompt.contains("ctx"));
        assert!(transcript(&agent, "s1").await.is_empty());
    }

    #[tokio::test]
    async fn failed_end_keeps_the_transcript() {
        let agent = agent_with(StaticRetriever::new(&[]), Arc::new(FailingLlm), AgentSettings::default());
        agent
            .record_resume(
                "s1",
                &ResumeAnalysis {
                    job_role: JobRole::General,
                    keywords: Vec::new(),
                    text: String::new(),
                },
            )
            .await
            .unwrap();
        assert!(agent.end("s1").await.is_err());
        assert_eq!(transcript(&agent, "s1").await.len(), 2);

        agent.reset("s1").await.unwrap();
        assert!(transcript(&agent, "s1").await.is_empty());
    }

    #[tokio::test]
    async fn condensing_rewrites_follow_ups_only() {
        let llm = ScriptedLlm::queued(
            &["Hi, introduce yourself.", "What is Rust's borrow checker?", "Good."],
            "unused",
        );
        let agent = agent_with(
            StaticRetriever::new(&[]),
            llm.clone(),
            AgentSettings {
                condense_questions: true,
                ..AgentSettings::default()
            },
        );
        agent.ask("s1", "hello", None).await.unwrap();
        let answer = agent.ask("s1", "what is it?", None).await.unwrap();

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("Follow Up Input: what is it?"));
        assert_eq!(answer.answer, "Good.");
        let turns = transcript(&agent, "s1").await;
        assert_eq!(turns[2], Turn::user("what is it?"));
    }
}
