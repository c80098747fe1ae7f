//! Length-bounded text segmentation.
//!
//! Long bodies are cut into chunks that fit a channel's message limit. Each cut
//! lands on the rightmost breaker (line break, then `", "` by default) that
//! lies entirely inside the limit; lengths are counted in `char`s.

use serde::{Deserialize, Serialize};

/// Default chunk limit, a few characters under Telegram's 4096.
pub const DEFAULT_MAX_LENGTH: usize = 4091;

/// Default breakers, in priority order.
pub const DEFAULT_BREAKERS: [&str; 2] = ["\n", ", "];

/// How much text is dropped after the breaker a chunk was cut at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerSkip {
    /// Drop exactly one character, whatever the breaker's length.
    ///
    /// After `", "` the next chunk starts with the space. This is the
    /// historical behavior and the default.
    #[default]
    SingleChar,
    /// Drop the whole breaker.
    FullBreaker,
}

/// Splits text into chunks of at most `max_length` characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splitter {
    max_length: usize,
    breakers: Vec<String>,
    skip: BreakerSkip,
}

impl Default for Splitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH)
    }
}

impl Splitter {
    /// A splitter with the default breakers and [`BreakerSkip::SingleChar`].
    ///
    /// A `max_length` of zero is treated as one.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            breakers: DEFAULT_BREAKERS.iter().map(|b| b.to_string()).collect(),
            skip: BreakerSkip::default(),
        }
    }

    /// Replace the breaker list. Empty strings are ignored.
    pub fn with_breakers<I, S>(mut self, breakers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.breakers = breakers
            .into_iter()
            .map(Into::into)
            .filter(|b: &String| !b.is_empty())
            .collect();
        self
    }

    pub fn with_skip(mut self, skip: BreakerSkip) -> Self {
        self.skip = skip;
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn breakers(&self) -> &[String] {
        &self.breakers
    }

    pub fn skip(&self) -> BreakerSkip {
        self.skip
    }

    /// Split `text` into ordered chunks.
    ///
    /// Text shorter than the limit comes back as a single chunk. Otherwise
    /// the chunk ends right before the rightmost breaker found inside the
    /// first `max_length` characters and the remainder is split again. With no
    /// breaker in range the text is hard-cut at `max_length` characters and
    /// nothing is dropped.
    ///
    /// Text of exactly `max_length` characters is still cut, so a trailing
    /// breaker produces a final empty chunk.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut rest = text;

        loop {
            // Fewer than `max_length` chars left: this is the last chunk
            if rest.char_indices().nth(self.max_length - 1).is_none() {
                chunks.push(rest.to_string());
                return chunks;
            }

            let window_end = rest
                .char_indices()
                .nth(self.max_length)
                .map_or(rest.len(), |(at, _)| at);
            let window = &rest[..window_end];

            match self.rightmost_breaker(window) {
                Some((at, breaker)) => {
                    chunks.push(rest[..at].to_string());
                    let skipped = match self.skip {
                        BreakerSkip::SingleChar => {
                            rest[at..].chars().next().map_or(0, char::len_utf8)
                        }
                        BreakerSkip::FullBreaker => breaker.len(),
                    };
                    rest = &rest[at + skipped..];
                }
                None => {
                    chunks.push(window.to_string());
                    rest = &rest[window_end..];
                }
            }
        }
    }

    /// Byte index and breaker of the rightmost breaker fully inside `window`.
    fn rightmost_breaker<'s>(&'s self, window: &str) -> Option<(usize, &'s str)> {
        self.breakers
            .iter()
            .filter_map(|breaker| window.rfind(breaker.as_str()).map(|at| (at, breaker.as_str())))
            .max_by_key(|&(at, _)| at)
    }
}

/// Split `text` with the given limit, breakers and skip mode.
pub fn split<S: AsRef<str>>(
    text: &str,
    max_length: usize,
    breakers: &[S],
    skip: BreakerSkip,
) -> Vec<String> {
    Splitter::new(max_length)
        .with_breakers(breakers.iter().map(|b| b.as_ref().to_string()))
        .with_skip(skip)
        .split(text)
}
