//! Fixed overrides for idioms the general pipeline mistranslates.
//! Matched on lowercased, trimmed input; a hit skips every later stage.

use crate::repair::SITUATIONSHIP_PHRASE;
use crate::style::Style;

struct DirectMapping {
    from: Style,
    to: Style,
    input: &'static str,
    output: &'static str,
}

const MAPPINGS: &[DirectMapping] = &[
    DirectMapping {
        from: Style::TrendSlang,
        to: Style::CasualPeer,
        input: "situationship",
        output: SITUATIONSHIP_PHRASE,
    },
    DirectMapping {
        from: Style::TrendSlang,
        to: Style::Standard,
        input: "situationship",
        output: "a romantic relationship that has not been defined",
    },
    DirectMapping {
        from: Style::TrendSlang,
        to: Style::Formal,
        input: "situationship",
        output: "an undefined romantic arrangement",
    },
    DirectMapping {
        from: Style::TrendSlang,
        to: Style::Standard,
        input: "no cap",
        output: "no lie",
    },
    DirectMapping {
        from: Style::TrendSlang,
        to: Style::CasualPeer,
        input: "no cap",
        output: "for real, no lie",
    },
];

pub fn lookup(from: Style, to: Style, text: &str) -> Option<&'static str> {
    let needle = text.trim().to_lowercase();
    MAPPINGS
        .iter()
        .find(|m| m.from == from && m.to == to && m.input == needle)
        .map(|m| m.output)
}
