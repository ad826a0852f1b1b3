//! Deterministic post-generation rewrites.
//! Each rule is a pure `text -> text` function; the chain applies them in a
//! fixed order. Rules may look at the original source text but keep no state.

use regex::{Captures, Regex};
use tracing::debug;

/// Canonical phrasing for "situationship" outside slang styles.
pub const SITUATIONSHIP_PHRASE: &str = "a relationship with no label";

/// Read-only inputs a rule may consult besides the text being rewritten.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub source_text: &'a str,
}

pub trait RepairRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, text: &str, ctx: &RepairContext<'_>) -> String;
}

/// Contraction -> the expansions a provider tends to substitute for it.
const CONTRACTIONS: &[(&str, &[&str])] = &[
    ("isn't", &["is not"]),
    ("aren't", &["are not"]),
    ("wasn't", &["was not"]),
    ("weren't", &["were not"]),
    ("don't", &["do not"]),
    ("doesn't", &["does not"]),
    ("didn't", &["did not"]),
    ("can't", &["cannot", "can not"]),
    ("won't", &["will not"]),
    ("wouldn't", &["would not"]),
    ("couldn't", &["could not"]),
    ("shouldn't", &["should not"]),
    ("haven't", &["have not"]),
    ("it's", &["it is"]),
    ("that's", &["that is"]),
    ("I'm", &["I am"]),
    ("you're", &["you are"]),
    ("we're", &["we are"]),
    ("they're", &["they are"]),
    ("let's", &["let us"]),
];

/// Copy the case of the match's first letter onto the replacement.
fn match_case(matched: &str, replacement: &str) -> String {
    let starts_upper = matched.chars().next().is_some_and(char::is_uppercase);
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) if starts_upper => first.to_uppercase().chain(chars).collect(),
        _ => replacement.to_string(),
    }
}

fn replace_matching_case(re: &Regex, text: &str, replacement: &str) -> String {
    re.replace_all(text, |caps: &Captures<'_>| match_case(&caps[0], replacement))
        .into_owned()
}

/// Restores whitelisted contractions the source used but the provider
/// expanded.
pub struct ContractionRestoration {
    /// (contracted form, source detector, expansion matcher)
    entries: Vec<(&'static str, Regex, Regex)>,
}

impl ContractionRestoration {
    pub const NAME: &'static str = "contraction_restoration";

    pub fn new() -> Self {
        let entries = CONTRACTIONS
            .iter()
            .map(|(contracted, expansions)| {
                let in_source = format!(
                    r"(?i)\b{}\b",
                    regex::escape(contracted).replace('\'', "['’]")
                );
                let expanded = expansions
                    .iter()
                    .map(|e| regex::escape(e).replace(' ', r"\s+"))
                    .collect::<Vec<_>>()
                    .join("|");
                (
                    *contracted,
                    Regex::new(&in_source).expect("static contraction pattern"),
                    Regex::new(&format!(r"(?i)\b(?:{expanded})\b")).expect("static expansion pattern"),
                )
            })
            .collect();
        Self { entries }
    }
}

impl Default for ContractionRestoration {
    fn default() -> Self {
        Self::new()
    }
}

impl RepairRule for ContractionRestoration {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, text: &str, ctx: &RepairContext<'_>) -> String {
        let mut out = text.to_string();
        for (contracted, in_source, expanded) in &self.entries {
            if in_source.is_match(ctx.source_text) {
                out = replace_matching_case(expanded, &out, contracted);
            }
        }
        out
    }
}

/// A source-term trigger with the rewrites it enables.
struct MisTranslation {
    trigger: Regex,
    rewrites: Vec<(Regex, &'static str)>,
}

/// Replaces phrasings the provider is known to get wrong for specific slang
/// terms in the source.
pub struct KnownMisTranslationFix {
    fixes: Vec<MisTranslation>,
}

impl KnownMisTranslationFix {
    pub const NAME: &'static str = "known_mistranslation_fix";

    pub fn new() -> Self {
        let re = |p: &str| Regex::new(p).expect("static mistranslation pattern");
        Self {
            fixes: vec![
                // "cap" means a lie, not an exaggeration.
                MisTranslation {
                    trigger: re(r"(?i)\b(?:no cap|cap|capping)\b"),
                    rewrites: vec![
                        (re(r"(?i)\ban exaggeration\b"), "a lie"),
                        (re(r"(?i)\bexaggerations\b"), "lies"),
                        (re(r"(?i)\bexaggeration\b"), "lie"),
                        (re(r"(?i)\bexaggerating\b"), "lying"),
                        (re(r"(?i)\bexaggerate\b"), "lie"),
                    ],
                },
                MisTranslation {
                    trigger: re(r"(?i)\bsituationships?\b"),
                    rewrites: vec![(
                        re(r"(?i)\b(?:an?\s+)?(?:undefined|ambiguous|unlabeled|unlabelled|complicated|uncommitted|non-committal|casual)\s+(?:romantic\s+)?relationship\b"),
                        SITUATIONSHIP_PHRASE,
                    )],
                },
            ],
        }
    }
}

impl Default for KnownMisTranslationFix {
    fn default() -> Self {
        Self::new()
    }
}

impl RepairRule for KnownMisTranslationFix {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, text: &str, ctx: &RepairContext<'_>) -> String {
        let mut out = text.to_string();
        for fix in self.fixes.iter().filter(|f| f.trigger.is_match(ctx.source_text)) {
            for (pattern, replacement) in &fix.rewrites {
                out = replace_matching_case(pattern, &out, replacement);
            }
        }
        out
    }
}

/// Ordered list of repair rules.
pub struct TextRepairChain {
    rules: Vec<Box<dyn RepairRule>>,
}

impl TextRepairChain {
    pub fn new(rules: Vec<Box<dyn RepairRule>>) -> Self {
        Self { rules }
    }

    /// Contraction restoration, then known mistranslation fixes.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(ContractionRestoration::new()),
            Box::new(KnownMisTranslationFix::new()),
        ])
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn apply(&self, text: &str, ctx: &RepairContext<'_>) -> String {
        self.rules.iter().fold(text.to_string(), |acc, rule| {
            let next = rule.apply(&acc, ctx);
            if next != acc {
                debug!(rule = rule.name(), "repair rule rewrote text");
            }
            next
        })
    }

    /// Apply only the named rule; the text is unchanged if no rule has it.
    pub fn apply_named(&self, name: &str, text: &str, ctx: &RepairContext<'_>) -> String {
        self.rules
            .iter()
            .find(|r| r.name() == name)
            .map_or_else(|| text.to_string(), |rule| rule.apply(text, ctx))
    }
}

impl Default for TextRepairChain {
    fn default() -> Self {
        Self::standard()
    }
}
