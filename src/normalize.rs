//! Flattening of free-form model replies into plain prose.
//!
//! A reply goes through one cleanup pass after another until a pass leaves
//! it unchanged, so `normalize(normalize(x)) == normalize(x)`. Each pass:
//!
//! 1. unwraps fenced code blocks,
//! 2. drops markdown headings, stacked bullets and emphasis,
//! 3. drops a line-leading `N. ` list number unless a digit follows it, so
//!    dates such as `2025. 6. 10.` survive,
//! 4. removes the boilerplate preambles listed in a [`PreambleRule`] table,
//! 5. collapses all whitespace (newlines included) to single spaces and trims.
//!
//! Built-in steps only ever delete text, so the loop ends on its own. Custom
//! rules may insert text and are limited to [`MAX_CUSTOM_PASSES`] passes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:json|text|markdown|md)?\s*([\s\S]*?)\s*```").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").unwrap());
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:[-+*•][ \t]+)+").unwrap());
static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d{1,2}\.[ \t]+([^\d\s])").unwrap());
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*+|_{2,}|~~|`+|#+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub const MAX_CUSTOM_PASSES: usize = 16;

/// Preambles the model tends to open with, in Korean and English.
const DEFAULT_PREAMBLES: &[&str] = &[
    r"제공해\s*주신\s*URL의\s*뉴스\s*기사\s*내용을\s*요약해\s*드리겠습니다[.:\s]*",
    r"제공해\s*주신\s*텍스트를\s*요약\s*하겠\s*습니다[.:\s]*(?:요약[.:\s]*)?",
    r"요약해\s*드리겠습니다[.:\s]*(?:주요\s*내용\s*요약[.:\s]*)?",
    r"다음\s*텍스트의\s*요약입니다[.:\s]*",
    r"주요\s*내용을\s*요약\s*하면\s*다음과\s*같습니다[.:\s]*",
    r"핵심\s*내용은\s*다음과\s*같습니다[.:\s]*",
    r"텍스트를\s*요약하면\s*다음과\s*같습니다[.:\s]*",
    r"제공된\s*텍스트에\s*대한\s*요약입니다[.:\s]*",
    r"다음은\s*ai가\s*내용을\s*요약한\s*것입니다[.:\s]*",
    r"다음은\s*요청하신\s*링크의\s*본문\s*내용입니다[.:\s]*",
    r"다음은\s*제공된\s*뉴스\s*기사의\s*핵심\s*내용입니다[.:\s]*",
    r"뉴스\s*기사\s*주요\s*내용\s*요약[.:\s]*",
    r"검색을\s*진행할\s*URL을\s*찾(?:고\s*있어요|았습니다)[.:\s]*\(1/3\)[^.]*(?:추출|확인)(?:하겠습니다|했습니다)[.:\s]*",
    r"이상입니다[.:\s]*(?:광고나\s*불필요한\s*정보는\s*제외하고\s*주요\s*내용만\s*추출했습니다[.:\s]*)?",
    r"요약하자면[.:\s]*",
    r"주요\s*요약[.:\s]*",
    r"주요\s*내용[.:\s]*",
    r"ai\s*답변[.:\s]*",
    r"ai\s*분석[.:\s]*",
    r"^\s*(?:sure|certainly|of course)[,!.]\s*",
    r"^\s*here(?:'s|\s+is)\s+(?:a|an|the)?\s*(?:brief|short|concise)?\s*summary[^.:\n]*[.:]\s*",
    r"^\s*(?:in\s+summary|to\s+summarize|summary)\s*[,:]\s*",
    r"^\s*key\s+points\s*[.:]\s*",
];

/// One `(pattern -> replacement)` entry of the preamble table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreambleRuleConfig {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

#[derive(Debug, Clone)]
pub struct PreambleRule {
    pattern: Regex,
    replacement: String,
}

impl PreambleRule {
    /// Patterns are matched case-insensitively.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&format!("(?i){pattern}"))?,
            replacement: replacement.into(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<PreambleRule>,
    custom: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        let rules = DEFAULT_PREAMBLES
            .iter()
            .map(|p| PreambleRule::new(p, "").expect("built-in preamble pattern"))
            .collect();
        Self { rules, custom: false }
    }
}

impl Normalizer {
    /// The built-in catalogue followed by `extra` rules.
    pub fn with_extra_rules(extra: &[PreambleRuleConfig]) -> Result<Self, regex::Error> {
        let mut normalizer = Self::default();
        for rule in extra {
            normalizer
                .rules
                .push(PreambleRule::new(&rule.pattern, rule.replacement.clone())?);
            normalizer.custom = true;
        }
        Ok(normalizer)
    }

    pub fn normalize(&self, raw: &str) -> String {
        let limit = if self.custom { MAX_CUSTOM_PASSES } else { usize::MAX };
        let mut current = raw.to_string();
        for _ in 0..limit {
            let next = self.pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn pass(&self, text: &str) -> String {
        let mut out = CODE_FENCE.replace_all(text, "$1").into_owned();
        out = HEADING.replace_all(&out, "").into_owned();
        out = BULLET.replace_all(&out, "").into_owned();
        out = NUMBERED.replace_all(&out, "$1").into_owned();
        out = EMPHASIS.replace_all(&out, "").into_owned();
        for rule in &self.rules {
            out = rule
                .pattern
                .replace_all(&out, rule.replacement.as_str())
                .into_owned();
        }
        WHITESPACE.replace_all(&out, " ").trim().to_string()
    }
}
