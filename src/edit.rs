use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Zero-based line/column location, matching tree-sitter points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub column: usize,
}

impl Position {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// One-based line number for log messages.
    pub fn line(&self) -> usize {
        self.row + 1
    }
}

/// The fundamental edit primitive: a byte-span replacement over an immutable
/// source snapshot.
///
/// Passes propose edits during analysis; [`apply_edits`] consumes them in one
/// batch. Spans are byte offsets, so application order cannot corrupt the
/// offsets of not-yet-applied edits as long as the batch is applied bottom-up.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "an Edit does nothing until passed to apply_edits"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    pub start: Position,
    pub end: Position,
    /// Replacement text; empty for deletions
    pub new_text: String,
    /// Verification of what we expect to find before applying
    pub expected_before: Option<EditVerification>,
    /// Set only by [`Edit::delete_with_leading_separator`]; exempts the edit
    /// from the same-line constraint.
    spans_separator: bool,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using a hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("invalid byte span [{byte_start}, {byte_end}) in snapshot of length {len}")]
    InvalidSpan {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("overlapping edits: [{}, {}) and [{}, {})", first.0, first.1, second.0, second.1)]
    Overlap {
        first: (usize, usize),
        second: (usize, usize),
    },

    #[error("before-text verification failed at byte {byte_start}: found {found:?}")]
    BeforeTextMismatch { byte_start: usize, found: String },
}

/// Result of applying an edit batch to a snapshot.
#[derive(Debug, Clone)]
pub struct Patched {
    pub text: String,
    /// Edits whose start and end fall on different lines. These are never
    /// applied; the caller reports them and falls back to a coarser
    /// pattern-based replacement.
    pub rejected: Vec<Edit>,
}

impl Patched {
    pub fn changed(&self, original: &str) -> bool {
        self.text != original
    }
}

impl Edit {
    /// Replace the text at a span.
    pub fn replace(
        byte_start: usize,
        byte_end: usize,
        start: Position,
        end: Position,
        new_text: impl Into<String>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            start,
            end,
            new_text: new_text.into(),
            expected_before: None,
            spans_separator: false,
        }
    }

    /// Attach an expected-before verification.
    pub fn with_expected(mut self, expected: &str) -> Self {
        self.expected_before = Some(EditVerification::from_text(expected));
        self
    }

    /// Delete a span together with the separator that would be left dangling.
    ///
    /// Walks backward from `byte_start`, across physical lines if necessary,
    /// to the nearest preceding comma and extends the deletion to cover the
    /// comma and the whitespace in between, rejoining the remainder. Used by
    /// passes that delete whole arguments from a call. Without a preceding
    /// comma the span is deleted as-is.
    pub fn delete_with_leading_separator(source: &str, byte_start: usize, byte_end: usize) -> Self {
        let bytes = source.as_bytes();
        let mut start = byte_start;
        let mut i = byte_start;
        while i > 0 {
            let c = bytes[i - 1];
            if c == b',' {
                start = i - 1;
                break;
            }
            if c.is_ascii_whitespace() {
                i -= 1;
                continue;
            }
            break;
        }
        Self {
            byte_start: start,
            byte_end,
            start: position_at(source, start),
            end: position_at(source, byte_end),
            new_text: String::new(),
            expected_before: None,
            spans_separator: true,
        }
    }
}

/// Compute the zero-based line/column position of a byte offset.
pub fn position_at(source: &str, byte: usize) -> Position {
    let prefix = &source[..byte];
    let row = prefix.bytes().filter(|&b| b == b'\n').count();
    let column = byte - prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
    Position { row, column }
}

/// Apply a batch of edits to an immutable snapshot.
///
/// Cross-line edits (other than separator-spanning deletions) are collected
/// into [`Patched::rejected`] instead of being applied. The remaining edits
/// are applied in reverse document order — bottommost first — which keeps the
/// offsets of not-yet-applied edits valid. Overlapping spans and failed
/// before-text verifications abort the whole batch.
pub fn apply_edits(source: &str, edits: Vec<Edit>) -> Result<Patched, EditError> {
    let mut rejected = Vec::new();
    let mut accepted = Vec::new();

    for edit in edits {
        if edit.byte_start > edit.byte_end
            || edit.byte_end > source.len()
            || !source.is_char_boundary(edit.byte_start)
            || !source.is_char_boundary(edit.byte_end)
        {
            return Err(EditError::InvalidSpan {
                byte_start: edit.byte_start,
                byte_end: edit.byte_end,
                len: source.len(),
            });
        }
        if edit.start.row != edit.end.row && !edit.spans_separator {
            rejected.push(edit);
        } else {
            accepted.push(edit);
        }
    }

    // Descending by start offset, so a plain forward loop applies bottom-up.
    accepted.sort_by(|a, b| {
        b.byte_start
            .cmp(&a.byte_start)
            .then(b.byte_end.cmp(&a.byte_end))
    });

    for window in accepted.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.byte_end > later.byte_start {
            return Err(EditError::Overlap {
                first: (earlier.byte_start, earlier.byte_end),
                second: (later.byte_start, later.byte_end),
            });
        }
    }

    for edit in &accepted {
        if let Some(expected) = &edit.expected_before {
            let current = &source[edit.byte_start..edit.byte_end];
            if !expected.matches(current) {
                return Err(EditError::BeforeTextMismatch {
                    byte_start: edit.byte_start,
                    found: current.to_string(),
                });
            }
        }
    }

    let mut text = source.to_string();
    for edit in &accepted {
        text.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
    }

    Ok(Patched { text, rejected })
}
