//! Pre-tokenization: splitting text into chunks that merges never cross.
//!
//! Two kinds of splitter are available:
//!
//! - [`SplitRules`]: an explicit left-to-right state machine over the seven
//!   GPT-4 style chunk classes ([`SplitRule`]). At each position the first
//!   rule that matches wins and consumes its greedy match. Runs in time
//!   linear in the input.
//! - A compiled regex (fancy-regex by default, PCRE2 with the `pcre2`
//!   feature) for arbitrary tiktoken-style patterns such as
//!   [`CL100K_BASE_PATTERN`](super::CL100K_BASE_PATTERN).
//!
//! Either way the produced chunks cover the input exactly once and in
//! order. Text a pattern does not match becomes its own chunk instead of
//! being dropped, so decoding always restores the original.
//!
//! # Character classes
//!
//! The rule backend classifies characters with the standard library:
//! letters are `is_alphabetic() && !is_numeric()`, digits are
//! `is_numeric()` and whitespace is `is_whitespace()`. These agree with the
//! regex classes `\p{L}`, `\p{N}` and `\s` everywhere except for combining
//! marks that Unicode counts as alphabetic. Use a pattern pre-tokenizer when
//! exact `\p{L}` semantics matter.

use fancy_regex::Regex as FancyRegex;
use log::warn;

#[cfg(feature = "pcre2")]
use pcre2::bytes::Regex as Pcre2Regex;

use super::tokenizer::TokenizerError;

#[inline]
fn is_letter(c: char) -> bool {
    c.is_alphabetic() && !c.is_numeric()
}

#[inline]
fn is_digit(c: char) -> bool {
    c.is_numeric()
}

#[inline]
fn is_newline(c: char) -> bool {
    c == '\r' || c == '\n'
}

#[inline]
fn is_symbol(c: char) -> bool {
    !c.is_whitespace() && !is_letter(c) && !is_digit(c)
}

/// Byte offset just past the run of `pred` characters starting at `from`.
#[inline]
fn run_end(s: &str, from: usize, pred: impl Fn(char) -> bool) -> usize {
    s[from..]
        .char_indices()
        .find(|&(_, c)| !pred(c))
        .map_or(s.len(), |(i, _)| from + i)
}

const CONTRACTION_SUFFIXES: [&str; 7] = ["s", "t", "re", "ve", "m", "ll", "d"];

/// One chunk class of the rule-based pre-tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitRule {
    /// `'s`, `'t`, `'re`, `'ve`, `'m`, `'ll`, `'d`, ASCII case-insensitive.
    Contraction,
    /// An optional character that is not a letter, digit or newline,
    /// followed by one or more letters.
    LetterRun,
    /// One to three digits.
    DigitRun,
    /// An optional space, one or more characters that are not whitespace,
    /// letters or digits, then any trailing `\r`/`\n`.
    SymbolRun,
    /// Whitespace up to and including its last newline.
    NewlineRun,
    /// Whitespace not followed by a non-whitespace character.
    TrailingWhitespace,
    /// Any whitespace run.
    Whitespace,
}

impl SplitRule {
    /// All classes in their default precedence order.
    pub const ALL: [SplitRule; 7] = [
        SplitRule::Contraction,
        SplitRule::LetterRun,
        SplitRule::DigitRun,
        SplitRule::SymbolRun,
        SplitRule::NewlineRun,
        SplitRule::TrailingWhitespace,
        SplitRule::Whitespace,
    ];

    /// Length in bytes of this rule's match at the start of `rest`, if any.
    ///
    /// Never returns `Some(0)`.
    pub fn match_len(self, rest: &str) -> Option<usize> {
        let first = rest.chars().next()?;
        match self {
            SplitRule::Contraction => {
                let tail = rest.strip_prefix('\'')?.as_bytes();
                CONTRACTION_SUFFIXES
                    .iter()
                    .find(|s| {
                        tail.len() >= s.len() && tail[..s.len()].eq_ignore_ascii_case(s.as_bytes())
                    })
                    .map(|s| 1 + s.len())
            }
            SplitRule::LetterRun => {
                let letters_from = if is_letter(first) {
                    0
                } else if !is_newline(first) && !is_digit(first) {
                    first.len_utf8()
                } else {
                    return None;
                };
                let end = run_end(rest, letters_from, is_letter);
                (end > letters_from).then_some(end)
            }
            SplitRule::DigitRun => {
                let end = rest
                    .char_indices()
                    .take_while(|&(_, c)| is_digit(c))
                    .take(3)
                    .last()
                    .map(|(i, c)| i + c.len_utf8())?;
                Some(end)
            }
            SplitRule::SymbolRun => {
                let symbols_from = match rest.strip_prefix(' ') {
                    Some(after) if after.chars().next().is_some_and(is_symbol) => 1,
                    _ => 0,
                };
                let symbols_end = run_end(rest, symbols_from, is_symbol);
                if symbols_end == symbols_from {
                    return None;
                }
                Some(run_end(rest, symbols_end, is_newline))
            }
            SplitRule::NewlineRun => {
                let ws_end = run_end(rest, 0, char::is_whitespace);
                rest[..ws_end].rfind(is_newline).map(|i| i + 1)
            }
            SplitRule::TrailingWhitespace => {
                let ws_end = run_end(rest, 0, char::is_whitespace);
                if ws_end == 0 {
                    return None;
                }
                if ws_end == rest.len() {
                    return Some(ws_end);
                }
                // Give back the last whitespace character so the run is
                // followed by whitespace, not by the next word.
                let last = rest[..ws_end].chars().next_back()?;
                let end = ws_end - last.len_utf8();
                (end > 0).then_some(end)
            }
            SplitRule::Whitespace => {
                let ws_end = run_end(rest, 0, char::is_whitespace);
                (ws_end > 0).then_some(ws_end)
            }
        }
    }
}

/// Ordered set of [`SplitRule`]s; earlier rules take precedence.
///
/// The default is [`SplitRule::ALL`], which approximates cl100k_base
/// splitting. The classes come from `char` predicates rather than Unicode
/// general categories, so text with alphabetic combining marks (Devanagari
/// vowel signs, U+0345) can split differently from the regex. Use
/// [`PreTokenizer::from_pattern`] when exact parity matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRules {
    rules: Vec<SplitRule>,
}

impl SplitRules {
    pub fn new(rules: impl IntoIterator<Item = SplitRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn rules(&self) -> &[SplitRule] {
        &self.rules
    }

    /// Split `text` into chunks.
    pub fn split<'r, 't>(&'r self, text: &'t str) -> RuleChunks<'r, 't> {
        RuleChunks {
            rules: self,
            text,
            pos: 0,
        }
    }

    /// Length of the chunk starting at the beginning of `rest` (non-empty).
    ///
    /// If no configured rule matches, the next character forms a chunk on
    /// its own so that coverage is preserved with partial rule sets.
    fn chunk_len(&self, rest: &str) -> usize {
        self.rules
            .iter()
            .find_map(|rule| rule.match_len(rest))
            .unwrap_or_else(|| rest.chars().next().map_or(rest.len(), char::len_utf8))
    }
}

impl Default for SplitRules {
    fn default() -> Self {
        Self::new(SplitRule::ALL)
    }
}

/// A span of input produced by pre-tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Byte offset of `text` within the split input.
    pub offset: usize,
    pub text: &'a str,
}

/// Iterator over the chunks of a [`SplitRules`] split.
#[derive(Debug, Clone)]
pub struct RuleChunks<'r, 't> {
    rules: &'r SplitRules,
    text: &'t str,
    pos: usize,
}

impl<'t> Iterator for RuleChunks<'_, 't> {
    type Item = Chunk<'t>;

    fn next(&mut self) -> Option<Chunk<'t>> {
        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return None;
        }
        let len = self.rules.chunk_len(rest);
        let chunk = Chunk {
            offset: self.pos,
            text: &rest[..len],
        };
        self.pos += len;
        Some(chunk)
    }
}

/// Boxed stream of `(start, end)` regex matches.
type MatchStream<'a> = Box<dyn Iterator<Item = Result<(usize, usize), String>> + 'a>;

/// Iterator over the chunks of a regex split, filling gaps between matches.
pub struct PatternChunks<'a> {
    text: &'a str,
    pos: usize,
    matches: MatchStream<'a>,
    pending: Option<(usize, usize)>,
}

impl<'a> PatternChunks<'a> {
    fn new(text: &'a str, matches: MatchStream<'a>) -> Self {
        Self {
            text,
            pos: 0,
            matches,
            pending: None,
        }
    }

    fn emit(&mut self, start: usize, end: usize) -> Chunk<'a> {
        self.pos = end;
        Chunk {
            offset: start,
            text: &self.text[start..end],
        }
    }

    fn emit_rest(&mut self) -> Option<Chunk<'a>> {
        let start = self.pos;
        (start < self.text.len()).then(|| self.emit(start, self.text.len()))
    }
}

impl<'a> Iterator for PatternChunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if let Some((start, end)) = self.pending.take() {
            return Some(self.emit(start, end));
        }
        loop {
            if self.pos >= self.text.len() {
                return None;
            }
            match self.matches.next() {
                Some(Ok((start, end))) => {
                    if end <= start || start < self.pos {
                        continue;
                    }
                    if !self.text.is_char_boundary(start) || !self.text.is_char_boundary(end) {
                        warn!(
                            "regex match {start}..{end} splits a character; \
                             keeping the rest as one chunk"
                        );
                        return self.emit_rest();
                    }
                    if start > self.pos {
                        self.pending = Some((start, end));
                        let gap_start = self.pos;
                        return Some(self.emit(gap_start, start));
                    }
                    return Some(self.emit(start, end));
                }
                Some(Err(err)) => {
                    warn!(
                        "regex match failed at offset {}: {err}; keeping the rest as one chunk",
                        self.pos
                    );
                    return self.emit_rest();
                }
                None => return self.emit_rest(),
            }
        }
    }
}

/// Chunk iterator returned by [`PreTokenizer::split`].
pub enum Chunks<'a> {
    Rules(RuleChunks<'a, 'a>),
    Pattern(PatternChunks<'a>),
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    #[inline]
    fn next(&mut self) -> Option<Chunk<'a>> {
        match self {
            Chunks::Rules(it) => it.next(),
            Chunks::Pattern(it) => it.next(),
        }
    }
}

/// Splitting backend.
#[derive(Debug, Clone)]
enum Backend {
    Rules(SplitRules),
    Fancy(Box<FancyRegex>),
    #[cfg(feature = "pcre2")]
    Pcre2(Pcre2Regex),
}

/// Text splitter applied to every plain (non-special) span before merging.
#[derive(Debug, Clone)]
pub struct PreTokenizer {
    backend: Backend,
    pattern: Option<String>,
    use_jit: bool,
}

impl PreTokenizer {
    /// Rule-based splitter.
    pub fn from_rules(rules: SplitRules) -> Self {
        Self {
            backend: Backend::Rules(rules),
            pattern: None,
            use_jit: true,
        }
    }

    /// Regex splitter using the fancy-regex backend.
    pub fn from_pattern(pattern: &str) -> Result<Self, TokenizerError> {
        let regex = FancyRegex::new(pattern)?;
        Ok(Self {
            backend: Backend::Fancy(Box::new(regex)),
            pattern: Some(pattern.to_string()),
            use_jit: true,
        })
    }

    /// The regex pattern, if this is a pattern splitter.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// The split rules, if this is a rule splitter.
    pub fn rules(&self) -> Option<&SplitRules> {
        match &self.backend {
            Backend::Rules(rules) => Some(rules),
            _ => None,
        }
    }

    /// Whether PCRE2 JIT is requested.
    pub fn jit_enabled(&self) -> bool {
        self.use_jit
    }

    /// Short backend name for diagnostics.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Rules(_) => "rules",
            Backend::Fancy(_) => "fancy-regex",
            #[cfg(feature = "pcre2")]
            Backend::Pcre2(_) => "pcre2",
        }
    }

    /// Split `text` into chunks. Each call starts a fresh pass.
    pub fn split<'a>(&'a self, text: &'a str) -> Chunks<'a> {
        match &self.backend {
            Backend::Rules(rules) => Chunks::Rules(rules.split(text)),
            Backend::Fancy(regex) => {
                let matches = regex
                    .find_iter(text)
                    .map(|m| m.map(|m| (m.start(), m.end())).map_err(|e| e.to_string()));
                Chunks::Pattern(PatternChunks::new(text, Box::new(matches)))
            }
            #[cfg(feature = "pcre2")]
            Backend::Pcre2(regex) => {
                let matches = regex
                    .find_iter(text.as_bytes())
                    .map(|m| m.map(|m| (m.start(), m.end())).map_err(|e| e.to_string()));
                Chunks::Pattern(PatternChunks::new(text, Box::new(matches)))
            }
        }
    }

    /// Switch a pattern splitter between the PCRE2 and fancy-regex backends.
    #[cfg(feature = "pcre2")]
    pub fn with_pcre2(mut self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        let Some(pattern) = self.pattern.clone() else {
            return if use_pcre2 {
                Err(TokenizerError::PatternRequired)
            } else {
                Ok(self)
            };
        };
        self.backend = if use_pcre2 {
            Backend::Pcre2(build_pcre2(&pattern, self.use_jit)?)
        } else {
            Backend::Fancy(Box::new(FancyRegex::new(&pattern)?))
        };
        Ok(self)
    }

    /// Switch to PCRE2 (stub when feature not enabled).
    #[cfg(not(feature = "pcre2"))]
    pub fn with_pcre2(self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        if use_pcre2 {
            Err(TokenizerError::Pcre2NotEnabled)
        } else {
            Ok(self)
        }
    }

    /// Enable or disable JIT compilation for the PCRE2 backend.
    ///
    /// Other backends record the setting and are otherwise unaffected.
    #[cfg(feature = "pcre2")]
    pub fn with_jit(mut self, use_jit: bool) -> Result<Self, TokenizerError> {
        self.use_jit = use_jit;
        if matches!(self.backend, Backend::Pcre2(_)) {
            let pattern = self.pattern.clone().ok_or(TokenizerError::PatternRequired)?;
            self.backend = Backend::Pcre2(build_pcre2(&pattern, use_jit)?);
        }
        Ok(self)
    }

    /// Enable or disable JIT compilation (non-pcre2 version).
    #[cfg(not(feature = "pcre2"))]
    pub fn with_jit(mut self, use_jit: bool) -> Result<Self, TokenizerError> {
        self.use_jit = use_jit;
        Ok(self)
    }
}

impl Default for PreTokenizer {
    fn default() -> Self {
        Self::from_rules(SplitRules::default())
    }
}

#[cfg(feature = "pcre2")]
fn build_pcre2(pattern: &str, use_jit: bool) -> Result<Pcre2Regex, TokenizerError> {
    let mut builder = pcre2::bytes::RegexBuilder::new();
    if use_jit {
        builder.jit_if_available(true);
    }
    builder.utf(true);
    builder.ucp(true);
    Ok(builder.build(pattern)?)
}
