//! Streaming text segmentation.
//!
//! A [`Segmenter`] turns a live-growing text buffer into discrete speakable
//! segments. It is polled repeatedly with the full accumulated buffer plus a
//! completion flag and scans once from its last unconsumed position, so a
//! token stream can be segmented while it is still arriving.
//!
//! Splitting rules:
//! - A mandatory break character closes a segment. Adjacent mandatory
//!   characters coalesce into one boundary; only the last of the run closes.
//! - An optional break character closes a segment once the accumulated text
//!   reaches a configurable minimum length.
//! - While the stream is open, a boundary touching the very end of the
//!   buffer is withheld (the terminator run may still grow); on completion
//!   everything left, including a trailing partial token, flushes.
//! - Text between the configured suppression markers is dropped, across
//!   polls; an unterminated region suppresses everything after it.
//! - An inline `[lang:xx]` marker sets the segment language and is stripped.

use crate::config::SegmenterConfig;
use tracing::warn;

/// A unit of speakable text extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The segment text, edge-trimmed, terminator included.
    pub text: String,
    /// True only on the first segment emitted for the stream.
    pub is_first: bool,
    /// Language tag parsed from an inline `[lang:xx]` marker, if any.
    pub language: Option<String>,
}

/// Incremental segmenter over a prefix-growing buffer.
///
/// Non-restartable: once a poll with `done = true` has flushed the stream,
/// further polls return nothing.
#[derive(Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
    /// Byte offset of consumed input in the source buffer.
    cursor: usize,
    /// Visible text of the segment under construction.
    pending: String,
    /// Inside a suppression region.
    suppressing: bool,
    emitted_any: bool,
    finished: bool,
}

impl Segmenter {
    /// Create a segmenter with the given configuration.
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            cursor: 0,
            pending: String::new(),
            suppressing: false,
            emitted_any: false,
            finished: false,
        }
    }

    /// True once a `done` poll has flushed the stream.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Scan the unconsumed tail of `buffer` and return newly closed segments.
    ///
    /// `buffer` must be prefix-stable between polls: earlier content never
    /// changes, new content only appends. `done` marks the stream complete
    /// and flushes the remaining text as a final segment.
    pub fn poll(&mut self, buffer: &str, done: bool) -> Vec<Segment> {
        if self.finished {
            return Vec::new();
        }

        let mut out = Vec::new();
        let start = self.cursor.min(buffer.len());
        let consumed = self.scan(&buffer[start..], done, &mut out);
        self.cursor = start + consumed;

        if done {
            if self.suppressing {
                warn!("suppression region never closed; trailing content dropped");
            }
            self.emit(&mut out);
            self.finished = true;
        }

        out
    }

    /// Consume as much of `tail` as can be decided now. Returns the number
    /// of bytes consumed; undecidable suffixes (a possible partial marker, a
    /// terminator run touching the open buffer end) are left for later polls.
    fn scan(&mut self, tail: &str, done: bool, out: &mut Vec<Segment>) -> usize {
        let cfg = self.config.clone();
        let is_mandatory = |c: char| c == '\n' || cfg.mandatory_breaks.contains(&c);

        let len = tail.len();
        let mut i = 0usize;
        while i < len {
            let rest = &tail[i..];

            if self.suppressing {
                if !cfg.suppress_close.is_empty() {
                    if rest.starts_with(&cfg.suppress_close) {
                        i += cfg.suppress_close.len();
                        self.suppressing = false;
                        continue;
                    }
                    if !done && is_partial_prefix(rest, &cfg.suppress_close) {
                        return i;
                    }
                }
                let Some(c) = rest.chars().next() else { break };
                i += c.len_utf8();
                continue;
            }

            if !cfg.suppress_open.is_empty() {
                if rest.starts_with(&cfg.suppress_open) {
                    i += cfg.suppress_open.len();
                    self.suppressing = true;
                    continue;
                }
                if !done && is_partial_prefix(rest, &cfg.suppress_open) {
                    return i;
                }
            }

            let Some(c) = rest.chars().next() else { break };

            if is_mandatory(c) {
                // Extent of the terminator run: adjacent mandatory
                // characters coalesce into a single boundary.
                let mut j = i;
                for rc in tail[i..].chars() {
                    if is_mandatory(rc) {
                        j += rc.len_utf8();
                    } else {
                        break;
                    }
                }
                if j == len && !done {
                    // The run touches the end of the open buffer and may
                    // still grow; withhold the whole segment.
                    return i;
                }
                self.pending.push_str(&tail[i..j]);
                self.emit(out);
                i = j;
                continue;
            }

            if cfg.optional_breaks.contains(&c) {
                let splits = cfg.min_optional_len == 0
                    || self.pending.chars().count() >= cfg.min_optional_len;
                let end = i + c.len_utf8();
                if splits {
                    if end == len && !done {
                        return i;
                    }
                    self.pending.push(c);
                    self.emit(out);
                } else {
                    self.pending.push(c);
                }
                i = end;
                continue;
            }

            self.pending.push(c);
            i += c.len_utf8();
        }

        len
    }

    /// Close the segment under construction, dropping it when nothing
    /// speakable remains after filtering.
    fn emit(&mut self, out: &mut Vec<Segment>) {
        let mut text = std::mem::take(&mut self.pending);
        let language = extract_language(&mut text);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        out.push(Segment {
            text: trimmed.to_owned(),
            is_first: !self.emitted_any,
            language,
        });
        self.emitted_any = true;
    }
}

/// True when all of `rest` is a proper prefix of `marker`, i.e. the marker
/// may complete in a later poll.
fn is_partial_prefix(rest: &str, marker: &str) -> bool {
    marker.len() > rest.len() && marker.as_bytes().starts_with(rest.as_bytes())
}

/// Parse and strip the first inline `[lang:xx]` marker.
fn extract_language(text: &mut String) -> Option<String> {
    const OPEN: &str = "[lang:";
    let start = text.find(OPEN)?;
    let rest = &text[start + OPEN.len()..];
    let end = rest.find(']')?;
    let tag = rest[..end].trim();
    if tag.is_empty() || tag.len() > 8 || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return None;
    }
    let tag = tag.to_owned();
    text.replace_range(start..start + OPEN.len() + end + 1, "");
    Some(tag)
}
