//! Plain-text rendering of build summaries and answers.

use std::fmt::Write;
use std::path::Path;

use passage_rag::{
    Answer, AnswerKind, Comparison, ComparisonAnalysis, ContextRelevance, Index, LengthVerdict,
    RetrievalStats, Usage,
};

const PREVIEW_CHARS: usize = 100;

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

fn kind_label(kind: AnswerKind) -> &'static str {
    match kind {
        AnswerKind::Grounded => "grounded",
        AnswerKind::Ungrounded => "ungrounded (no passage passed the filter)",
        AnswerKind::Diagnostic => "diagnostic (a service call failed)",
    }
}

fn usage_line(usage: Option<Usage>) -> String {
    match usage {
        Some(u) => format!(
            "{} tokens ({} prompt, {} completion)",
            u.total_tokens, u.prompt_tokens, u.completion_tokens
        ),
        None => "unavailable".to_string(),
    }
}

fn retrieval_line(stats: &RetrievalStats) -> String {
    let mut line = format!(
        "{} candidates, {} admitted, {} filtered out",
        stats.candidates, stats.admitted, stats.filtered_out
    );
    if let Some(threshold) = stats.threshold {
        let _ = write!(line, " (threshold {threshold:.2})");
    }
    if let (Some(min), Some(mean), Some(max)) =
        (stats.min_similarity, stats.mean_similarity, stats.max_similarity)
    {
        let _ = write!(line, "; similarity min {min:.4} / avg {mean:.4} / max {max:.4}");
    }
    line
}

/// Summary printed after `passage index`.
pub fn index_summary(index: &Index, output: &Path) -> String {
    let meta = index.metadata();
    let failed = index.failed_passages();
    let mut out = String::new();
    let _ = writeln!(out, "Index saved to {}", output.display());
    let _ = writeln!(out, "  passages:        {} ({} failed)", index.len(), failed.len());
    let _ = writeln!(out, "  chunk size:      {} chars, overlap {}", meta.chunk_size, meta.overlap);
    let _ = writeln!(out, "  embedding model: {}", meta.embedding_model);
    if let Some(query_model) = &meta.query_model {
        let _ = writeln!(out, "  query model:     {query_model}");
    }
    let _ = writeln!(out, "  dimension:       {}", meta.embedding_dimension);
    let _ = writeln!(out, "  tokens used:     {}", meta.total_tokens_used);
    if !failed.is_empty() {
        let _ = writeln!(out, "  failed passages: {failed:?}");
    }
    if let Some(first) = index.passages().first() {
        let _ = writeln!(out, "\nFirst passage (chars {}..{}):", first.char_start, first.char_end);
        let _ = writeln!(out, "  {}", preview(&first.text));
    }
    out
}

/// An answer followed by its provenance.
pub fn answer(answer: &Answer) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Answer ===\n{}\n", answer.text);
    let _ = writeln!(out, "--- Details ---");
    let _ = writeln!(out, "kind:  {}", kind_label(answer.kind));
    let _ = writeln!(out, "usage: {}", usage_line(answer.usage));
    if let Some(stats) = &answer.retrieval {
        let _ = writeln!(out, "retrieval: {}", retrieval_line(stats));
    }
    if !answer.used_passages.is_empty() {
        let _ = writeln!(out, "passages used:");
        for (rank, ranked) in answer.used_passages.iter().enumerate() {
            let _ = writeln!(
                out,
                "  #{} passage {} (similarity {:.4}): {}",
                rank + 1,
                ranked.passage.id,
                ranked.similarity,
                preview(&ranked.passage.text)
            );
        }
    }
    out
}

fn analysis_lines(analysis: &ComparisonAnalysis) -> Vec<String> {
    let mut lines = Vec::new();
    match analysis.length {
        LengthVerdict::RetrievalLonger => {
            lines.push("+ retrieval gave the more detailed answer".to_string());
        }
        LengthVerdict::BaselineLonger => {
            lines.push("! the answer without retrieval is longer".to_string());
        }
        LengthVerdict::Similar => {}
    }
    if analysis.cites_sources {
        lines.push("+ the retrieval answer refers to the document".to_string());
    }
    if analysis.more_specific {
        lines.push("+ the retrieval answer is more specific".to_string());
    }
    if let (Some(band), Some(mean)) = (analysis.relevance, analysis.mean_relevance) {
        let line = match band {
            ContextRelevance::High => format!("+ high context relevance ({mean:.3})"),
            ContextRelevance::Medium => format!("! medium context relevance ({mean:.3})"),
            ContextRelevance::Low => format!("- low context relevance ({mean:.3})"),
        };
        lines.push(line);
    }
    lines
}

/// Both sides of a with/without retrieval comparison, then how they differ.
pub fn comparison(comparison: &Comparison) -> String {
    let mut out = format!("Question: {}\n\n", comparison.question);
    out.push_str("##### With retrieval #####\n");
    out.push_str(&answer(&comparison.with_retrieval));
    out.push_str("\n##### Without retrieval #####\n");
    out.push_str(&answer(&comparison.without_retrieval));
    out.push_str("\n##### Analysis #####\n");
    let lines = analysis_lines(&comparison.analysis);
    if lines.is_empty() {
        out.push_str("No substantial differences found.\n");
    }
    for line in lines {
        let _ = writeln!(out, "{line}");
    }
    out
}
