//! Positional grading of multiple-choice quiz submissions.

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A malformed quiz submission. Reported to the user as a retry
/// prompt, never treated as fatal.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("expected {expected} answers, got {got}")]
    WrongCount { expected: usize, got: usize },
    #[error("no answers found in submission")]
    Empty,
}

// ---------------------------------------------------------------------------
// Grading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizResult {
    /// Number of positions matching the answer key.
    pub correct: usize,
    /// One feedback line per question, regardless of score.
    pub feedback: Vec<String>,
}

/// Align a delimited answer submission against the fixed answer key.
///
/// Tokens may be separated by commas and/or whitespace and are compared
/// case-insensitively. There is no pass threshold: any parseable
/// submission is gradeable, and the caller completes the task whatever
/// the score.
pub fn grade(input: &str, key: &[String]) -> Result<QuizResult, QuizError> {
    let tokens: Vec<String> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return Err(QuizError::Empty);
    }
    if tokens.len() != key.len() {
        return Err(QuizError::WrongCount {
            expected: key.len(),
            got: tokens.len(),
        });
    }

    let mut correct = 0;
    let mut feedback = Vec::with_capacity(key.len());
    for (i, (given, expected)) in tokens.iter().zip(key).enumerate() {
        if given.eq_ignore_ascii_case(expected) {
            correct += 1;
            feedback.push(format!("{}. ✅ `{}` is correct\n", i + 1, given));
        } else {
            feedback.push(format!(
                "{}. ❌ `{}` is incorrect, the correct answer was `{}`\n",
                i + 1,
                given,
                expected
            ));
        }
    }

    Ok(QuizResult { correct, feedback })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
