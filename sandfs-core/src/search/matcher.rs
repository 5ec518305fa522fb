//! Pattern compilation: literal substring counters and safety-checked regex.
//!
//! A [`Matcher`] is pure and thread-safe: it holds no I/O handles and no
//! cross-line state, so workers share compiled instances freely.

use memchr::memmem;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::config::constants::search;
use crate::error::{ServiceError, ServiceResult};

/// Options a matcher is compiled with; part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatcherOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub literal: bool,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            whole_word: false,
            literal: false,
        }
    }
}

/// A compiled pattern exposing a per-line occurrence count.
#[derive(Debug)]
pub enum Matcher {
    Literal(LiteralMatcher),
    Regex(regex::Regex),
}

/// Substring counter; case-insensitive mode lowercases once at build time
/// and once per scanned line.
#[derive(Debug)]
pub struct LiteralMatcher {
    needle: String,
    case_sensitive: bool,
}

impl LiteralMatcher {
    fn count(&self, line: &str) -> usize {
        if self.needle.is_empty() {
            return 0;
        }
        if self.case_sensitive {
            memmem::find_iter(line.as_bytes(), self.needle.as_bytes()).count()
        } else {
            let lowered = line.to_lowercase();
            memmem::find_iter(lowered.as_bytes(), self.needle.as_bytes()).count()
        }
    }
}

impl Matcher {
    /// Compile `pattern` under `options`.
    ///
    /// Regex patterns must pass [`check_pattern_safety`] first; unsafe ones
    /// fail with `E_INVALID_INPUT` before any file is opened.
    pub fn build(pattern: &str, options: MatcherOptions) -> ServiceResult<Self> {
        if pattern.is_empty() {
            return Err(ServiceError::invalid_input("Search pattern must not be empty"));
        }

        if options.literal && !options.whole_word {
            let needle = if options.case_sensitive {
                pattern.to_string()
            } else {
                pattern.to_lowercase()
            };
            return Ok(Self::Literal(LiteralMatcher {
                needle,
                case_sensitive: options.case_sensitive,
            }));
        }

        let source = if options.literal {
            regex::escape(pattern)
        } else {
            check_pattern_safety(pattern)?;
            pattern.to_string()
        };
        let source = if options.whole_word {
            format!(r"\b(?:{source})\b")
        } else {
            source
        };

        let regex = RegexBuilder::new(&source)
            .case_insensitive(!options.case_sensitive)
            .size_limit(search::REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| ServiceError::invalid_input(format!("Invalid regex pattern: {e}")))?;
        Ok(Self::Regex(regex))
    }

    /// Number of matches on a single line.
    pub fn count(&self, line: &str) -> usize {
        match self {
            Self::Literal(literal) => literal.count(line),
            Self::Regex(regex) => regex.find_iter(line).count(),
        }
    }

    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Literal(literal) => literal.count(line) > 0,
            Self::Regex(regex) => regex.is_match(line),
        }
    }
}

/// Reject patterns with catastrophic-backtracking shapes before compilation.
///
/// The engine itself is linear-time, but patterns of the `(x+)+` family and
/// huge bounded repetitions still compile to state machines large or slow
/// enough to act as a denial of service, so they are refused outright.
pub fn check_pattern_safety(pattern: &str) -> ServiceResult<()> {
    let unsafe_err = |detail: &str| {
        ServiceError::invalid_input(format!(
            "Unsafe regex pattern rejected (ReDoS risk): {detail}"
        ))
    };

    let chars: Vec<char> = pattern.chars().collect();
    // Stack of open groups; each records whether a quantifier appeared inside.
    let mut group_stack: Vec<bool> = Vec::new();
    let mut escaped = false;
    let mut in_class = false;
    let mut index = 0usize;

    while index < chars.len() {
        let ch = chars[index];
        if escaped {
            escaped = false;
            index += 1;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            _ if in_class => {}
            '(' => group_stack.push(false),
            ')' => {
                let had_quantifier = group_stack.pop().unwrap_or(false);
                let quantified = matches!(chars.get(index + 1), Some('+' | '*'))
                    || matches!(chars.get(index + 1), Some('{'));
                if had_quantifier && quantified {
                    return Err(unsafe_err("nested unbounded quantifier, e.g. (x+)+"));
                }
                if had_quantifier && let Some(parent) = group_stack.last_mut() {
                    *parent = true;
                }
            }
            '+' | '*' => {
                if let Some(open) = group_stack.last_mut() {
                    *open = true;
                }
            }
            '{' => {
                let close = chars[index..].iter().position(|&c| c == '}');
                if let Some(rel) = close {
                    let body: String = chars[index + 1..index + rel].iter().collect();
                    let lower = body.split(',').next().unwrap_or("");
                    if let Ok(n) = lower.trim().parse::<u32>()
                        && n >= search::MAX_REGEX_REPETITION
                    {
                        return Err(unsafe_err("bounded repetition with a large minimum"));
                    }
                    if let Some(open) = group_stack.last_mut() {
                        *open = true;
                    }
                    index += rel;
                }
            }
            _ => {}
        }
        index += 1;
    }

    Ok(())
}
