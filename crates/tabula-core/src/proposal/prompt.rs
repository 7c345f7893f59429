//! Prompt construction for LLM-backed proposal generation.
//!
//! Sections are delimited with XML tags so the model can tell dataset
//! statistics, the user's words and the previous failure apart.

use tabula_types::proposal::ProposalContext;

/// System prompt: role, output contract and examples.
pub const SYSTEM_PROMPT: &str = r#"You are a precise data cleaning assistant working on a pandas DataFrame named `df`.

Reply with exactly one JSON object and nothing else:
{"kind": "answer" | "code" | "clarify", "content": "..."}

- "answer": a plain-text reply when no change to the data is needed.
- "code": Python/pandas code that transforms `df` in place or reassigns it (`df = ...`).
  Only `df` and `pd` are available. Do not import modules, read or write files, or print.
- "clarify": a question asking the user for missing details.

Choose imputation strategies that fit each column's type. Do not wrap content in markdown.

Examples:
{"kind": "answer", "content": "Age has 177 missing values (19.9%). Median is 28.0."}
{"kind": "code", "content": "df['Age'] = df['Age'].fillna(df['Age'].median())"}
{"kind": "clarify", "content": "Which imputation method: mean, median, or mode?"}"#;

/// Build the user turn for one proposal request.
pub fn build_user_prompt(context: &ProposalContext) -> String {
    let mut prompt = format!(
        "<dataset_stats>\n{}\n</dataset_stats>\n\n<user_request>\n{}\n</user_request>\n",
        context.stats_summary.trim_end(),
        context.user_message.trim(),
    );

    if let Some(error) = &context.prior_error {
        let attempt = context.retry_number.unwrap_or(0) + 1;
        prompt.push_str(&format!(
            "\n<previous_attempt_failed attempt=\"{attempt}\" max=\"{max}\">\n{error}\n</previous_attempt_failed>\n\
             Fix the problem and try a different approach if needed.\n",
            max = context.max_retries,
        ));
    }

    prompt.push_str("\nRespond with only the JSON object.");
    prompt
}
