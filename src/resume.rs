//! Resume text extraction, role detection and keyword extraction.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::embedder::{cosine_similarity, embed_all, Embedder};
use crate::error::{AppError, AppResult};
use crate::role::JobRole;

/// Keywords returned per resume.
pub const DEFAULT_TOP_N: usize = 25;
/// Most frequent candidate phrases kept before embedding.
pub const DEFAULT_MAX_CANDIDATES: usize = 200;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "been",
    "before", "beforehand", "behind", "being", "below", "beside", "besides", "between",
    "beyond", "both", "but", "by", "can", "cannot", "could", "did", "do", "does", "done",
    "down", "due", "during", "each", "eg", "either", "else", "elsewhere", "enough", "etc",
    "even", "ever", "every", "everyone", "everything", "everywhere", "except", "few", "for",
    "former", "formerly", "from", "further", "had", "has", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hers", "herself", "him", "himself", "his", "how",
    "however", "i", "ie", "if", "in", "inc", "indeed", "into", "is", "it", "its", "itself",
    "last", "latter", "least", "less", "ltd", "many", "may", "me", "meanwhile", "might", "mine",
    "more", "moreover", "most", "mostly", "much", "must", "my", "myself", "namely", "neither",
    "never", "nevertheless", "next", "no", "nobody", "none", "noone", "nor", "not", "nothing",
    "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or", "other",
    "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "per", "perhaps",
    "please", "rather", "re", "same", "seem", "seemed", "seeming", "seems", "several", "she",
    "should", "since", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "than", "that", "the", "their", "them",
    "themselves", "then", "thence", "there", "thereafter", "thereby", "therefore", "therein",
    "these", "they", "this", "those", "though", "through", "throughout", "thru", "thus", "to",
    "together", "too", "toward", "towards", "under", "until", "up", "upon", "us", "very", "via",
    "was", "we", "well", "were", "what", "whatever", "when", "whence", "whenever", "where",
    "whereas", "whereby", "wherein", "whether", "which", "while", "who", "whoever", "whole",
    "whom", "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your",
    "yours", "yourself", "yourselves",
];

/// What a resume upload tells us about the candidate.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeAnalysis {
    /// Role detected from the resume text.
    pub job_role: JobRole,
    /// Key phrases, most representative first.
    pub keywords: Vec<String>,
    /// Extracted plain text.
    #[serde(skip)]
    pub text: String,
}

/// KeyBERT-style key phrase extraction over an [`Embedder`].
pub struct KeywordExtractor {
    embedder: Arc<dyn Embedder>,
    top_n: usize,
    max_candidates: usize,
}

impl KeywordExtractor {
    /// Extractor returning `top_n` phrases out of `max_candidates` candidates.
    pub fn new(embedder: Arc<dyn Embedder>, top_n: usize, max_candidates: usize) -> Self {
        Self {
            embedder,
            top_n,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Ranks candidate phrases by cosine similarity to the whole document.
    pub async fn extract(&self, text: &str) -> anyhow::Result<Vec<String>> {
        let candidates = candidate_phrases(text, self.max_candidates);
        if candidates.is_empty() || self.top_n == 0 {
            return Ok(Vec::new());
        }
        let mut inputs = Vec::with_capacity(candidates.len() + 1);
        inputs.push(text.to_string());
        inputs.extend(candidates.iter().cloned());
        let vectors = embed_all(self.embedder.as_ref(), &inputs).await?;
        let (document, phrases) = vectors
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no document vector"))?;

        let mut scored: Vec<(f32, String)> = phrases
            .iter()
            .map(|vector| cosine_similarity(document, vector))
            .zip(candidates)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(self.top_n);
        Ok(scored.into_iter().map(|(_, phrase)| phrase).collect())
    }
}

/// One- and two-word phrases without stop words, most frequent first.
///
/// Ties keep first-occurrence order.
pub fn candidate_phrases(text: &str, max_candidates: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
        .filter(|token| token.chars().count() >= 2)
        .filter(|token| !STOP_WORDS.contains(token))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut bump = |phrase: String| {
        let count = counts.entry(phrase.clone()).or_insert(0);
        if *count == 0 {
            order.push(phrase);
        }
        *count += 1;
    };
    for (idx, token) in tokens.iter().enumerate() {
        bump(token.to_string());
        if let Some(next) = tokens.get(idx + 1) {
            bump(format!("{token} {next}"));
        }
    }

    let mut ranked: Vec<(usize, String)> = order
        .into_iter()
        .map(|phrase| (counts.get(&phrase).copied().unwrap_or(0), phrase))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked.truncate(max_candidates);
    ranked.into_iter().map(|(_, phrase)| phrase).collect()
}

/// Extracts text from an uploaded resume and derives role and keywords.
pub struct ResumeAnalyzer {
    keywords: KeywordExtractor,
}

impl ResumeAnalyzer {
    /// Analyzer with the default keyword limits.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_limits(embedder, DEFAULT_TOP_N, DEFAULT_MAX_CANDIDATES)
    }

    /// Analyzer with explicit keyword limits.
    pub fn with_limits(embedder: Arc<dyn Embedder>, top_n: usize, max_candidates: usize) -> Self {
        Self {
            keywords: KeywordExtractor::new(embedder, top_n, max_candidates),
        }
    }

    /// Analyzes a PDF upload.
    pub async fn analyze(&self, pdf: Vec<u8>) -> AppResult<ResumeAnalysis> {
        if pdf.is_empty() {
            return Err(AppError::InvalidRequest("resume file is empty".into()));
        }
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&pdf))
            .await
            .map_err(|err| AppError::Ingestion(format!("pdf extraction aborted: {err}")))??;
        self.analyze_text(text).await
    }

    /// Analyzes already extracted resume text.
    pub async fn analyze_text(&self, text: String) -> AppResult<ResumeAnalysis> {
        if text.trim().is_empty() {
            return Err(AppError::Ingestion("resume contains no extractable text".into()));
        }
        let job_role = JobRole::classify(&text);
        let keywords = self
            .keywords
            .extract(&text)
            .await
            .map_err(AppError::retrieval)?;
        tracing::info!(
            role = %job_role,
            keywords = keywords.len(),
            "analyzed resume"
        );
        Ok(ResumeAnalysis {
            job_role,
            keywords,
            text,
        })
    }
}

fn extract_pdf_text(bytes: &[u8]) -> AppResult<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|err| AppError::Ingestion(format!("failed to extract PDF text: {err}")))?;
    let text = pages
        .iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(text)
}
