//! Turn-based transcript assembly.
//!
//! Partials from the active speaker extend the open turn. Any other event
//! that ends a turn (the other speaker talking, turn complete, barge-in,
//! session end) closes it, and closed turns are never touched again.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    pub open: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<TranscriptTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one transcription partial. Empty partials are ignored.
    pub fn append(&mut self, speaker: Speaker, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.turns.last_mut()
            && last.open
        {
            if last.speaker == speaker {
                last.text.push_str(text);
                return;
            }
            last.open = false;
        }
        self.turns.push(TranscriptTurn {
            speaker,
            text: text.to_string(),
            open: true,
        });
    }

    pub fn close_open_turns(&mut self) {
        if let Some(last) = self.turns.last_mut() {
            last.open = false;
        }
    }

    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(transcript: &Transcript) -> Vec<(Speaker, &str)> {
        transcript
            .turns()
            .iter()
            .map(|t| (t.speaker, t.text.as_str()))
            .collect()
    }

    #[test]
    fn test_consecutive_partials_merge_into_one_turn() {
        let mut transcript = Transcript::new();
        transcript.append(Speaker::Assistant, "Xin");
        transcript.append(Speaker::Assistant, " chào");

        assert_eq!(texts(&transcript), vec![(Speaker::Assistant, "Xin chào")]);
        assert!(transcript.turns()[0].open);
    }

    #[test]
    fn test_other_speaker_splits_turns() {
        let mut transcript = Transcript::new();
        transcript.append(Speaker::Assistant, "Xin");
        transcript.append(Speaker::User, "hello");
        transcript.append(Speaker::Assistant, " chào");

        assert_eq!(
            texts(&transcript),
            vec![
                (Speaker::Assistant, "Xin"),
                (Speaker::User, "hello"),
                (Speaker::Assistant, " chào"),
            ]
        );
        let open: Vec<bool> = transcript.turns().iter().map(|t| t.open).collect();
        assert_eq!(open, vec![false, false, true]);
    }

    #[test]
    fn test_partial_after_close_starts_new_turn() {
        let mut transcript = Transcript::new();
        transcript.append(Speaker::Assistant, "One.");
        transcript.close_open_turns();
        transcript.append(Speaker::Assistant, "Two.");

        assert_eq!(
            texts(&transcript),
            vec![(Speaker::Assistant, "One."), (Speaker::Assistant, "Two.")]
        );
        assert!(!transcript.turns()[0].open);
    }

    #[test]
    fn test_empty_partial_is_ignored() {
        let mut transcript = Transcript::new();
        transcript.append(Speaker::User, "");
        assert!(transcript.is_empty());

        transcript.append(Speaker::User, "hi");
        transcript.append(Speaker::Assistant, "");
        assert_eq!(texts(&transcript), vec![(Speaker::User, "hi")]);
        assert!(transcript.turns()[0].open);
    }

    #[test]
    fn test_close_on_empty_transcript_is_noop() {
        let mut transcript = Transcript::new();
        transcript.close_open_turns();
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_speaker_labels() {
        assert_eq!(Speaker::User.to_string(), "user");
        assert_eq!(Speaker::Assistant.as_str(), "assistant");
    }
}
