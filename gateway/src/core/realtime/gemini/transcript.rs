//! Turn-level coalescing of streamed transcriptions.
//!
//! The server streams partial input/output transcriptions and model text;
//! nothing is surfaced until the turn completes, so each completed turn yields
//! at most one learner line and one teacher message.

use super::messages::ServerContent;

/// What a completed turn produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedTurn {
    /// What the learner said, if the server transcribed anything
    pub learner: Option<String>,
    pub teacher: Option<String>,
}

#[derive(Debug, Default)]
pub struct TurnCoalescer {
    pending_input: String,
    pending_output: String,
    pending_model_text: String,
}

impl TurnCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one `serverContent` in. Returns the finished turn when the
    /// message completes it.
    pub fn absorb(&mut self, content: &ServerContent) -> Option<CompletedTurn> {
        if let Some(text) = content
            .input_transcription
            .as_ref()
            .and_then(|t| t.text.as_deref())
        {
            Self::keep_latest(&mut self.pending_input, text);
        }
        if let Some(text) = content
            .output_transcription
            .as_ref()
            .and_then(|t| t.text.as_deref())
        {
            Self::keep_latest(&mut self.pending_output, text);
        }
        for text in content.text_parts() {
            if !text.trim().is_empty() {
                self.pending_model_text.push_str(text);
            }
        }

        content.completes_turn().then(|| self.complete())
    }

    /// Flush and reset. Output transcription wins over model text because it
    /// matches what was spoken.
    pub fn complete(&mut self) -> CompletedTurn {
        let learner = (!self.pending_input.is_empty()).then(|| std::mem::take(&mut self.pending_input));

        let teacher = if !self.pending_output.is_empty() {
            Some(std::mem::take(&mut self.pending_output))
        } else {
            let text = self.pending_model_text.trim();
            (!text.is_empty()).then(|| text.to_string())
        };

        self.clear();
        CompletedTurn { learner, teacher }
    }

    pub fn clear(&mut self) {
        self.pending_input.clear();
        self.pending_output.clear();
        self.pending_model_text.clear();
    }

    fn keep_latest(slot: &mut String, text: &str) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            slot.clear();
            slot.push_str(trimmed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::gemini::messages::ServerMessage;

    fn content(json: &str) -> ServerContent {
        ServerMessage::parse(json).unwrap().server_content.unwrap()
    }

    #[test]
    fn test_partials_emit_nothing_until_complete() {
        let mut coalescer = TurnCoalescer::new();

        assert!(coalescer
            .absorb(&content(r#"{"serverContent":{"outputTranscription":{"text":"Hel"}}}"#))
            .is_none());
        assert!(coalescer
            .absorb(&content(
                r#"{"serverContent":{"outputTranscription":{"text":" Hello! "}}}"#
            ))
            .is_none());

        let turn = coalescer
            .absorb(&content(r#"{"serverContent":{"turnComplete":true}}"#))
            .unwrap();
        assert_eq!(turn.teacher.as_deref(), Some("Hello!"));
        assert_eq!(turn.learner, None);
    }

    #[test]
    fn test_output_transcript_preferred_over_model_text() {
        let mut coalescer = TurnCoalescer::new();
        coalescer.absorb(&content(
            r#"{"serverContent":{"modelTurn":{"parts":[{"text":"Model says"}]},"outputTranscription":{"text":"Spoken words"}}}"#,
        ));

        let turn = coalescer.complete();
        assert_eq!(turn.teacher.as_deref(), Some("Spoken words"));
    }

    #[test]
    fn test_model_text_concatenated_and_trimmed() {
        let mut coalescer = TurnCoalescer::new();
        coalescer.absorb(&content(
            r#"{"serverContent":{"modelTurn":{"parts":[{"text":" Good "},{"text":"   "},{"text":"job! "}]}}}"#,
        ));

        let turn = coalescer
            .absorb(&content(r#"{"serverContent":{"generationComplete":true}}"#))
            .unwrap();
        assert_eq!(turn.teacher.as_deref(), Some("Good job!"));
    }

    #[test]
    fn test_learner_line_and_reset() {
        let mut coalescer = TurnCoalescer::new();
        coalescer.absorb(&content(
            r#"{"serverContent":{"inputTranscription":{"text":"I like cats"},"outputTranscription":{"text":"Cats are great!"}}}"#,
        ));
        // A blank partial does not erase what came before
        coalescer.absorb(&content(
            r#"{"serverContent":{"inputTranscription":{"text":"  "}}}"#,
        ));

        let turn = coalescer.complete();
        assert_eq!(turn.learner.as_deref(), Some("I like cats"));
        assert_eq!(turn.teacher.as_deref(), Some("Cats are great!"));

        assert_eq!(coalescer.complete(), CompletedTurn::default());
    }
}
