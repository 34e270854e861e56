//! Text Segmentation
//!
//! Turns token fragments from a model into units a consumer can act on:
//! whole sentences for display, or speakable chunks for a speech engine
//! that should start talking before the sentence is over.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pump::Pump;

/// Characters that end a sentence
const SENTENCE_END: &[char] = &['.', '!', '?', '…', '。', '！', '？'];

/// Characters allowed after the sentence end (`"Done."` or `(ok.)`)
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', ']', '»'];

/// Whether `fragment` finishes a sentence
#[must_use]
pub fn ends_sentence(fragment: &str) -> bool {
    fragment
        .trim_end()
        .trim_end_matches(CLOSERS)
        .ends_with(SENTENCE_END)
}

/// Whether `fragment` ends between words
fn ends_word(fragment: &str) -> bool {
    fragment
        .chars()
        .next_back()
        .is_some_and(|c| c.is_whitespace() || c.is_ascii_punctuation() || SENTENCE_END.contains(&c))
}

fn join(bundle: Vec<String>) -> String {
    bundle.concat().trim().to_string()
}

/// How token fragments are grouped before output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segmentation {
    /// Pass fragments through untouched
    Fragments,
    /// Group into whole sentences
    #[default]
    Sentences,
    /// Group into chunks worth speaking
    Speakable,
}

impl fmt::Display for Segmentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fragments => write!(f, "fragments"),
            Self::Sentences => write!(f, "sentences"),
            Self::Speakable => write!(f, "speakable"),
        }
    }
}

impl FromStr for Segmentation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fragments" | "raw" => Ok(Self::Fragments),
            "sentences" => Ok(Self::Sentences),
            "speakable" | "speech" => Ok(Self::Speakable),
            other => Err(format!("Unknown segmentation mode: {other}")),
        }
    }
}

impl Pump<String> {
    /// Group fragments into trimmed sentences
    ///
    /// Whatever is left when the source ends is emitted as a final,
    /// possibly unfinished sentence. Blank results are skipped.
    pub fn sentences(self) -> Pump<String> {
        self.bundle(|fragment, _| ends_sentence(fragment))
            .map(join)
            .filter(|sentence| !sentence.is_empty())
    }

    /// Group fragments into chunks worth handing to a speech engine
    ///
    /// A chunk closes at the end of a sentence, or once it holds at least
    /// `min_chars` characters and its last fragment ends between words.
    /// Fragments are never split.
    pub fn speakable(self, min_chars: usize) -> Pump<String> {
        self.bundle(move |fragment, bundle| {
            if ends_sentence(fragment) {
                return true;
            }
            let chars: usize = bundle.iter().map(|f| f.chars().count()).sum();
            chars >= min_chars && ends_word(fragment)
        })
        .map(join)
        .filter(|chunk| !chunk.is_empty())
    }

    /// Apply `segmentation`
    ///
    /// `min_chars` is only used by [`Segmentation::Speakable`].
    pub fn segment(self, segmentation: Segmentation, min_chars: usize) -> Pump<String> {
        match segmentation {
            Segmentation::Fragments => self,
            Segmentation::Sentences => self.sentences(),
            Segmentation::Speakable => self.speakable(min_chars),
        }
    }
}
