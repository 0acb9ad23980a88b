//! Built-in injection pattern dictionary.
//!
//! Seven severity-ranked categories, checked in the order declared here
//! (matching first-match-wins category ordering during the highest-severity
//! scan). Patterns compile into a [`regex::RegexSet`] for a fast first-pass
//! scan, then individual [`regex::Regex`]es are re-run only on the
//! categories that matched, to recover match spans and text.

use std::borrow::Cow;

use regex::{Regex, RegexSet};

use super::Severity;

/// High-level classification of an injection pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PatternCategory {
    /// Attempts to cancel or override prior instructions.
    InstructionOverride,
    /// Attempts to redefine the model's identity or role.
    RoleHijack,
    /// Attempts to exfiltrate the system prompt or hidden instructions.
    PromptExtraction,
    /// Abuse of chat-format delimiters to forge a new turn.
    DelimiterInjection,
    /// Indirect phrasing that nudges the model away from its instructions.
    IndirectManipulation,
    /// Encoded payloads (base64/hex/rot13) used to smuggle instructions.
    EncodedInjection,
    /// Lower-confidence phrasing worth flagging but not blocking alone.
    SuspiciousContext,
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InstructionOverride => "instruction_override",
            Self::RoleHijack => "role_hijack",
            Self::PromptExtraction => "prompt_extraction",
            Self::DelimiterInjection => "delimiter_injection",
            Self::IndirectManipulation => "indirect_manipulation",
            Self::EncodedInjection => "encoded_injection",
            Self::SuspiciousContext => "suspicious_context",
        };
        write!(f, "{s}")
    }
}

/// A single built-in detection pattern.
#[derive(Debug, Clone)]
pub struct InjectionPattern {
    pub category: PatternCategory,
    pub description: Cow<'static, str>,
    pub regex_str: Cow<'static, str>,
    pub severity: Severity,
}

macro_rules! pat {
    ($cat:expr, $desc:expr, $re:expr, $sev:expr) => {
        InjectionPattern {
            category: $cat,
            description: Cow::Borrowed($desc),
            regex_str: Cow::Borrowed($re),
            severity: $sev,
        }
    };
}

/// Returns the full built-in pattern set, in category-declaration order.
#[must_use]
pub fn builtin_patterns() -> Vec<InjectionPattern> {
    use PatternCategory::{
        DelimiterInjection, EncodedInjection, IndirectManipulation, InstructionOverride,
        PromptExtraction, RoleHijack, SuspiciousContext,
    };
    use Severity::{Critical, High, Low, Medium};

    vec![
        // ── instruction_override ────────────────────────────────────
        pat!(
            InstructionOverride,
            "Ignore previous/prior/above/earlier instructions",
            r"(?i)ignore\s+(all\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?|context)",
            Critical
        ),
        pat!(
            InstructionOverride,
            "Disregard previous/prior/above/earlier instructions",
            r"(?i)disregard\s+(all\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?)",
            Critical
        ),
        pat!(
            InstructionOverride,
            "Forget previous/prior/above/earlier instructions",
            r"(?i)forget\s+(all\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?)",
            Critical
        ),
        pat!(
            InstructionOverride,
            "Override system/previous/prior prompt or instructions",
            r"(?i)override\s+(system|previous|prior)\s+(prompt|instructions?)",
            Critical
        ),
        pat!(
            InstructionOverride,
            "New instructions: ignore",
            r"(?i)new\s+instructions?\s*[:;]\s*ignore",
            Critical
        ),
        pat!(
            InstructionOverride,
            "[system] you are now",
            r"(?i)\[?\s*system\s*\]?\s*[:;]?\s*you\s+are\s+now",
            Critical
        ),
        // ── role_hijack ──────────────────────────────────────────────
        pat!(
            RoleHijack,
            "You are now a/an/the ... assistant/agent/bot",
            r"(?i)you\s+are\s+now\s+(?:a|an|the)\s+\w+\s+(?:assistant|agent|bot)",
            Critical
        ),
        pat!(
            RoleHijack,
            "Act as a/an/the ... assistant/agent/bot",
            r"(?i)act\s+as\s+(?:a|an|the)\s+\w+\s+(?:assistant|agent|bot)",
            Critical
        ),
        pat!(
            RoleHijack,
            "Pretend you're/to be a/an/the",
            r"(?i)pretend\s+(?:you'?re?|to\s+be)\s+(?:a|an|the)",
            Critical
        ),
        pat!(
            RoleHijack,
            "Your new role/identity/persona is",
            r"(?i)your\s+new\s+(?:role|identity|persona)\s+is",
            Critical
        ),
        pat!(
            RoleHijack,
            "From now on, you are/will",
            r"(?i)from\s+now\s+on[,]?\s+you\s+(?:are|will)",
            Critical
        ),
        // ── prompt_extraction ────────────────────────────────────────
        pat!(
            PromptExtraction,
            "Reveal/show/display/print/output your system prompt or instructions",
            r"(?i)(?:reveal|show|display|print|output)\s+(?:your\s+)?(?:system\s+)?(?:prompt|instructions)",
            High
        ),
        pat!(
            PromptExtraction,
            "What are/is your system prompt or instructions",
            r"(?i)what\s+(?:are|is)\s+your\s+(?:system\s+)?(?:prompt|instructions)",
            High
        ),
        pat!(
            PromptExtraction,
            "Repeat your system prompt or instructions",
            r"(?i)repeat\s+(?:your\s+)?(?:system\s+)?(?:prompt|instructions)",
            High
        ),
        pat!(
            PromptExtraction,
            "Echo your system prompt or instructions",
            r"(?i)echo\s+(?:your\s+)?(?:system\s+)?(?:prompt|instructions)",
            High
        ),
        // ── delimiter_injection ──────────────────────────────────────
        pat!(
            DelimiterInjection,
            "Chat-role tag (<system>, </user>, ...)",
            r"<\s*/?\s*(?:system|user|assistant|instruction|prompt)\s*>",
            High
        ),
        pat!(
            DelimiterInjection,
            "Bracketed role token ([INST], [SYS], ...)",
            r"\[\s*(?:INST|SYS|USER|ASSISTANT)\s*\]",
            High
        ),
        pat!(
            DelimiterInjection,
            "Markdown heading role marker (### System)",
            r"(?i)###\s*(?:System|User|Assistant|Instruction)",
            High
        ),
        pat!(
            DelimiterInjection,
            "Double-angle role marker (<<SYS>>)",
            r"(?i)<<\s*(?:SYS|INST|USER)\s*>>",
            High
        ),
        // ── indirect_manipulation ────────────────────────────────────
        pat!(
            IndirectManipulation,
            "(Please/do not) follow these/the instructions or rules",
            r"(?i)(?:please\s+)?(?:do\s+)?(?:not\s+)?follow\s+(?:these|the)\s+(?:instructions?|rules?)",
            Medium
        ),
        pat!(
            IndirectManipulation,
            "Important/urgent/critical: you must/always/never",
            r"(?i)(?:important|urgent|critical)\s*[:!]\s*(?:you\s+must|always|never)",
            Medium
        ),
        pat!(
            IndirectManipulation,
            "Admin/administrator/sudo/root prefix",
            r"(?i)(?:admin|administrator|sudo|root)\s*[:;]\s*",
            Medium
        ),
        pat!(
            IndirectManipulation,
            "Developer mode enabled/activated/on",
            r"(?i)developer\s+mode\s+(?:enabled?|activated?|on)",
            Medium
        ),
        // ── encoded_injection ────────────────────────────────────────
        pat!(
            EncodedInjection,
            "Inline base64 payload",
            r"(?i)base64\s*[:;]\s*[A-Za-z0-9+/=]{20,}",
            Medium
        ),
        pat!(
            EncodedInjection,
            "Inline hex payload",
            r"(?i)hex\s*[:;]\s*[0-9A-Fa-f]{20,}",
            Medium
        ),
        pat!(
            EncodedInjection,
            "Inline rot13 payload",
            r"(?i)rot13\s*[:;]\s*[A-Za-z]{10,}",
            Medium
        ),
        // ── suspicious_context ───────────────────────────────────────
        pat!(
            SuspiciousContext,
            "Execute/run/eval this/the following code or command",
            r"(?i)(?:execute|run|eval)\s+(?:this|the\s+following)\s+(?:code|command)",
            Low
        ),
        pat!(
            SuspiciousContext,
            "Output the following/this exactly",
            r"(?i)output\s+(?:the\s+following|this)\s+exactly",
            Low
        ),
        pat!(
            SuspiciousContext,
            "Respond only with the following/this",
            r"(?i)respond\s+(?:only\s+)?with\s+(?:the\s+following|this)",
            Low
        ),
    ]
}

/// Compiled form of [`builtin_patterns`]: a [`RegexSet`] for the O(n)
/// first-pass scan, plus individually compiled [`Regex`]es (same index
/// order) for span extraction once a category is known to match.
pub struct CompiledPatterns {
    pub(crate) patterns: Vec<InjectionPattern>,
    pub(crate) set: RegexSet,
    pub(crate) individual: Vec<Regex>,
}

impl CompiledPatterns {
    /// Compiles the built-in pattern dictionary. Panics only if a built-in
    /// regex literal is malformed, which would be a programming error
    /// caught immediately by the unit tests below.
    #[must_use]
    pub fn new() -> Self {
        let patterns = builtin_patterns();
        let individual: Vec<Regex> = patterns
            .iter()
            .map(|p| Regex::new(&p.regex_str).expect("builtin pattern must compile"))
            .collect();
        let set = RegexSet::new(patterns.iter().map(|p| p.regex_str.as_ref()))
            .expect("builtin pattern set must compile");
        Self {
            patterns,
            set,
            individual,
        }
    }
}

impl Default for CompiledPatterns {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_seven_categories_represented() {
        let categories: std::collections::HashSet<_> =
            builtin_patterns().iter().map(|p| p.category).collect();
        assert!(categories.contains(&PatternCategory::InstructionOverride));
        assert!(categories.contains(&PatternCategory::RoleHijack));
        assert!(categories.contains(&PatternCategory::PromptExtraction));
        assert!(categories.contains(&PatternCategory::DelimiterInjection));
        assert!(categories.contains(&PatternCategory::IndirectManipulation));
        assert!(categories.contains(&PatternCategory::EncodedInjection));
        assert!(categories.contains(&PatternCategory::SuspiciousContext));
    }

    #[test]
    fn all_patterns_compile_individually() {
        for p in &builtin_patterns() {
            Regex::new(&p.regex_str)
                .unwrap_or_else(|e| panic!("pattern '{}' failed to compile: {e}", p.description));
        }
    }

    #[test]
    fn compiled_patterns_set_matches_same_count() {
        let compiled = CompiledPatterns::new();
        assert_eq!(compiled.patterns.len(), compiled.individual.len());
    }
}
