//! Prompt construction for one rewrite batch.
//!
//! Pure functions of the job's source texts plus a static style table; the
//! single-object and `variants`-array response shapes are mutually exclusive
//! and the matching system prompt must be chosen per batch size.

use crate::text::LanguageFingerprint;

/// Rotating stylistic directives used to diversify variants across batches.
const STYLE_PRESETS: [&str; 5] = [
    "hook=rhetorical question; tone=conversational; sentences=short; pacing=fast",
    "hook=leading number; tone=enthusiastic; sentences=short; pacing=medium",
    "hook=suspense; tone=plain and credible; sentences=medium; pacing=slow",
    "hook=contrast; tone=curious; sentences=short; pacing=fast",
    "hook=imperative; tone=direct and forceful; sentences=short; pacing=fast",
];

/// Style seed for a batch, selected round-robin by batch index.
pub fn style_preset(batch_index: usize) -> &'static str {
    STYLE_PRESETS[batch_index % STYLE_PRESETS.len()]
}

/// Builds the system/user prompt pair for each batch of a job.
pub struct PromptBuilder {
    caption_body: String,
    caption_fingerprint: LanguageFingerprint,
    tts: Option<(String, LanguageFingerprint)>,
}

impl PromptBuilder {
    /// `caption_body` must already have its hashtags stripped.
    pub fn new(
        caption_body: String,
        caption_fingerprint: LanguageFingerprint,
        tts: Option<(String, LanguageFingerprint)>,
    ) -> Self {
        Self {
            caption_body,
            caption_fingerprint,
            tts,
        }
    }

    pub fn tts_mode(&self) -> bool {
        self.tts.is_some()
    }

    /// Build the `(system_prompt, user_prompt)` pair for one batch of `k`
    /// variants.
    pub fn build(&self, batch_index: usize, k: u32) -> (String, String) {
        (self.system_prompt(k), self.user_prompt(batch_index, k))
    }

    fn language_rules(&self) -> String {
        let scope = if self.tts_mode() {
            "rewrite the TTS strictly in the language(s)/mix of the TTS source; \
             rewrite the caption strictly in the language(s)/mix of the caption body; "
        } else {
            "rewrite the caption strictly in the language(s)/mix of the caption body; "
        };
        format!(
            "- Language preservation: {}never translate or substitute across languages; \
             keep the original code-switching positions and ratio; leave brand names, \
             place names, personal names, model numbers, digits, currency symbols and \
             emoji exactly as they are.",
            scope
        )
    }

    fn base_rules(&self) -> String {
        let mut rules = String::new();
        if self.tts_mode() {
            rules.push_str(
                "- TTS: conversational and easy to read aloud; keep the length close to \
                 the source (within ±20%); avoid tongue-twisters and overlong sentences.\n",
            );
        }
        rules.push_str(
            "- Caption: open with a strong hook (≤10 characters for Chinese, ≤6 words \
             for English); never add new hashtags; no # tags may appear in the body.\n\
             - Output valid JSON only.",
        );
        rules
    }

    fn system_prompt(&self, k: u32) -> String {
        let structure = if self.tts_mode() {
            r#"{"tts":"...","caption":"..."}"#
        } else {
            r#"{"caption":"..."}"#
        };

        let shape = if k == 1 {
            format!(
                "Output strict JSON: a single object, never an array and never a \
                 \"variants\" key. Structure: {}.",
                structure
            )
        } else {
            format!(
                "Output strict JSON: one object containing a \"variants\" array. \
                 Structure: {{\"variants\":[{}, ...]}}.\n\
                 The variants array must have exactly the requested length, no more \
                 and no fewer.",
                structure
            )
        };

        format!(
            "You rewrite short-video scripts. {}\n{}\n{}",
            shape,
            self.language_rules(),
            self.base_rules()
        )
    }

    fn user_prompt(&self, batch_index: usize, k: u32) -> String {
        let shape_instruction = if k == 1 {
            "return a single JSON object directly".to_string()
        } else {
            format!(
                "return one JSON object with a \"variants\" array whose length is exactly {}",
                k
            )
        };

        let mut prompt = format!(
            "[Task] Produce {} distinct variant(s) this round; {}; return nothing but JSON.\n\
             [Style seed] {}\n",
            k,
            shape_instruction,
            style_preset(batch_index)
        );

        if let Some((tts_source, tts_fingerprint)) = &self.tts {
            prompt.push_str(&format!("[TTS language fingerprint] {}\n", tts_fingerprint));
            prompt.push_str(&format!(
                "[Caption language fingerprint] {}\n\n",
                self.caption_fingerprint
            ));
            prompt.push_str(&format!("[TTS source]\n{}\n\n", tts_source));
        } else {
            prompt.push_str(&format!(
                "[Caption language fingerprint] {}\n\n",
                self.caption_fingerprint
            ));
        }

        prompt.push_str(&format!(
            "[Caption body (hashtags removed)]\n{}\n\n",
            self.caption_body
        ));
        prompt.push_str(&format!("[Output JSON template]\n{}\n", self.template(k)));
        prompt
    }

    fn template(&self, k: u32) -> &'static str {
        match (self.tts_mode(), k) {
            (true, 1) => {
                "{\n  \"tts\": \"rewritten TTS script (same language mix, no translation)\",\n  \"caption\": \"rewritten caption (same language mix, no translation; no hashtags)\"\n}"
            }
            (true, _) => "{\n  \"variants\": [\n    {\"tts\": \"...\", \"caption\": \"...\"}\n  ]\n}",
            (false, 1) => {
                "{\n  \"caption\": \"rewritten caption (same language mix, no translation; no hashtags)\"\n}"
            }
            (false, _) => "{\n  \"variants\": [\n    {\"caption\": \"...\"}\n  ]\n}",
        }
    }
}
