//! Placeholder protection for tokens the provider must not rewrite:
//! URLs, e-mail addresses, @mentions and #hashtags.
//!
//! Tokens are numbered in order of appearance (`<<PH0>>`, `<<PH1>>`, ...).
//! Where two patterns overlap, the earlier and then longer match wins.

use regex::{Captures, Regex};

/// Originals of the protected tokens, indexed by placeholder number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placeholders {
    originals: Vec<String>,
}

impl Placeholders {
    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    pub fn original(&self, index: usize) -> Option<&str> {
        self.originals.get(index).map(String::as_str)
    }
}

fn tag(index: usize) -> String {
    format!("<<PH{index}>>")
}

pub struct PlaceholderProtector {
    tokens: Vec<Regex>,
    tag: Regex,
}

impl PlaceholderProtector {
    pub fn new() -> Self {
        let re = |p: &str| Regex::new(p).expect("static placeholder pattern");
        Self {
            tokens: vec![
                re(r"https?://[^\s,)\]]+"),
                re(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}"),
                re(r"(?:^|\B)@[A-Za-z0-9_]{2,}"),
                re(r"(?:^|\B)#[A-Za-z0-9_]{2,}"),
            ],
            tag: re(r"<<PH(\d+)>>"),
        }
    }

    pub fn protect(&self, text: &str) -> (String, Placeholders) {
        let mut spans: Vec<(usize, usize)> = self
            .tokens
            .iter()
            .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.end())))
            .collect();
        spans.sort_by_key(|&(start, end)| (start, std::cmp::Reverse(end)));

        let mut protected = String::with_capacity(text.len());
        let mut placeholders = Placeholders::default();
        let mut cursor = 0;
        for (start, end) in spans {
            if start < cursor {
                continue;
            }
            protected.push_str(&text[cursor..start]);
            protected.push_str(&tag(placeholders.len()));
            placeholders.originals.push(text[start..end].to_string());
            cursor = end;
        }
        protected.push_str(&text[cursor..]);
        (protected, placeholders)
    }

    /// Put the originals back. Tags the provider dropped stay dropped; tags
    /// it invented are left as written.
    pub fn restore(&self, text: &str, placeholders: &Placeholders) -> String {
        if placeholders.is_empty() {
            return text.to_string();
        }
        self.tag
            .replace_all(text, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| placeholders.original(i))
                    .map_or_else(|| caps[0].to_string(), str::to_string)
            })
            .into_owned()
    }
}

impl Default for PlaceholderProtector {
    fn default() -> Self {
        Self::new()
    }
}
