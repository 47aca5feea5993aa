//! Source-text utilities: hashtag handling, language fingerprints and the
//! punctuation normalization required by the TTS synthesis consumer.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn hashtag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([\w\-\u{4e00}-\u{9fff}]+)").unwrap())
}

fn whitespace_run_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").unwrap())
}

/// Split a caption into its body and the hashtags it carries.
///
/// Tags are preserved verbatim (with leading `#`) so they can be re-appended
/// to every rewritten variant; the model never sees them. The body has the
/// tags removed and runs of whitespace collapsed.
pub fn split_caption_and_tags(caption: &str) -> (String, Vec<String>) {
    let tags: Vec<String> = hashtag_pattern()
        .captures_iter(caption)
        .map(|c| format!("#{}", &c[1]))
        .collect();

    let body = hashtag_pattern().replace_all(caption, "");
    let body = whitespace_run_pattern().replace_all(&body, " ");
    (body.trim().to_string(), tags)
}

/// Coarse script categories detected in a source text.
///
/// Used only as a hint to the model so it preserves the source's language mix;
/// never mutated after detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageFingerprint {
    scripts: Vec<&'static str>,
}

impl LanguageFingerprint {
    /// Detect which script families are present in the text.
    pub fn detect(text: &str) -> Self {
        let checks: [(&'static str, fn(char) -> bool); 9] = [
            ("Chinese", |c| matches!(c, '\u{4e00}'..='\u{9fff}')),
            ("Latin", |c| c.is_ascii_alphabetic()),
            ("Japanese", |c| {
                matches!(c, '\u{3040}'..='\u{309f}' | '\u{30a0}'..='\u{30ff}')
            }),
            ("Korean", |c| matches!(c, '\u{ac00}'..='\u{d7af}')),
            ("Thai", |c| matches!(c, '\u{0e00}'..='\u{0e7f}')),
            ("Cyrillic", |c| matches!(c, '\u{0400}'..='\u{04ff}')),
            ("Arabic", |c| matches!(c, '\u{0600}'..='\u{06ff}')),
            ("Digits", |c| c.is_ascii_digit()),
            ("Emoji", |c| matches!(c, '\u{1f300}'..='\u{1faff}')),
        ];

        let scripts = checks
            .iter()
            .filter(|(_, test)| text.chars().any(*test))
            .map(|(name, _)| *name)
            .collect();

        Self { scripts }
    }

    /// Detected script names, in a fixed order.
    pub fn scripts(&self) -> &[&'static str] {
        &self.scripts
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl fmt::Display for LanguageFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scripts.is_empty() {
            write!(f, "Unknown")
        } else {
            write!(f, "{}", self.scripts.join(", "))
        }
    }
}

// Chinese and English punctuation, dashes/ellipsis, brackets, angle and corner
// quotes, smart quotes and misc marks. The ASCII apostrophe is deliberately
// absent so contractions and possessives survive.
const TTS_PUNCTUATION: &str = concat!(
    "\u{ff0c}\u{3002}\u{ff01}\u{ff1f}\u{ff1b}\u{ff1a}\u{3001}",
    ",.!?;:",
    "-\u{2014}\u{2026}~\u{ff5e}",
    "\u{ff08}\u{ff09}()",
    "[]\u{3010}\u{3011}",
    "\u{300a}\u{300b}\u{3008}\u{3009}",
    "\u{300c}\u{300d}\u{300e}\u{300f}",
    "\u{201c}\u{201d}\u{2018}\u{2019}",
    "\"",
    "`/|\\",
);

/// Convert every punctuation mark in a TTS script to a line break.
///
/// Batch-generated TTS documents cannot infer sentence breaks from punctuation
/// alone, so the synthesis consumer requires one clause per line.
pub fn preprocess_tts_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let replaced: String = text
        .chars()
        .map(|c| if TTS_PUNCTUATION.contains(c) { '\n' } else { c })
        .collect();

    replaced
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_caption_and_tags() {
        let (body, tags) = split_caption_and_tags("Hello #fun #test");
        assert_eq!(body, "Hello");
        assert_eq!(tags, vec!["#fun", "#test"]);
    }

    #[test]
    fn test_split_caption_with_cjk_tags() {
        let (body, tags) = split_caption_and_tags("今天的穿搭 #穿搭 #ootd 分享给你们");
        assert_eq!(body, "今天的穿搭 分享给你们");
        assert_eq!(tags, vec!["#穿搭", "#ootd"]);
    }

    #[test]
    fn test_split_caption_without_tags() {
        let (body, tags) = split_caption_and_tags("Just a plain caption");
        assert_eq!(body, "Just a plain caption");
        assert!(tags.is_empty());
    }

    #[test]
    fn test_fingerprint_mixed_text() {
        let fp = LanguageFingerprint::detect("今天 vlog day 3 🎉");
        assert_eq!(fp.to_string(), "Chinese, Latin, Digits, Emoji");
    }

    #[test]
    fn test_fingerprint_unknown() {
        let fp = LanguageFingerprint::detect("……");
        assert!(fp.is_empty());
        assert_eq!(fp.to_string(), "Unknown");
    }

    #[test]
    fn test_fingerprint_japanese_korean() {
        let fp = LanguageFingerprint::detect("こんにちは 안녕하세요");
        assert_eq!(fp.scripts(), &["Japanese", "Korean"]);
    }

    #[test]
    fn test_preprocess_tts_text() {
        assert_eq!(preprocess_tts_text("你好，世界。再见！"), "你好\n世界\n再见");
        assert_eq!(preprocess_tts_text("one, two. three!"), "one\ntwo\nthree");
    }

    #[test]
    fn test_preprocess_tts_keeps_apostrophes() {
        assert_eq!(preprocess_tts_text("don't stop, now!"), "don't stop\nnow");
    }

    #[test]
    fn test_preprocess_tts_drops_empty_lines() {
        assert_eq!(preprocess_tts_text("a,,b,, ,c"), "a\nb\nc");
        assert_eq!(preprocess_tts_text(""), "");
    }
}
