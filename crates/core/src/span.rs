use std::ops::Range;

use serde::Serialize;

use crate::error::HuffError;

/// Index of a fragment inside an [`InputMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Absolute character range in the concatenated program text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn shifted(self, delta: usize) -> Self {
        Self::new(self.start + delta, self.end + delta)
    }
}

/// One loaded file. `text` is what the parser sees; `original` is the file as
/// written and has the same byte length, so lines and diagnostics are taken
/// from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFragment {
    pub filename: String,
    pub text: String,
    original: Option<String>,
    line_starts: Vec<usize>,
}

impl SourceFragment {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = line_starts(&text);
        Self {
            filename: filename.into(),
            text,
            original: None,
            line_starts,
        }
    }

    /// Fragment whose parser view was derived from `original` by blanking.
    pub fn blanked(
        filename: impl Into<String>,
        original: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let original = original.into();
        let text = text.into();
        debug_assert_eq!(original.len(), text.len());
        let line_starts = line_starts(&original);
        Self {
            filename: filename.into(),
            text,
            original: Some(original),
            line_starts,
        }
    }

    pub fn original(&self) -> &str {
        self.original.as_deref().unwrap_or(&self.text)
    }

    /// Zero-based line containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        self.line_starts
            .partition_point(|line_start| *line_start <= offset)
            .saturating_sub(1)
    }

    pub fn line_text(&self, line: usize) -> &str {
        let original = self.original();
        let start = self.line_starts[line];
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(original.len());
        original[start..end].trim_end_matches('\r')
    }
}

fn line_starts(text: &str) -> Vec<usize> {
    let mut line_starts = vec![0];
    for (offset, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            line_starts.push(offset + 1);
        }
    }
    line_starts
}

/// Per-byte source attribution as exposed in compiler output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub filename: String,
    pub line_number: usize,
    pub line_text: String,
}

impl SourceLocation {
    /// `file:line` with a one-based line number.
    pub fn display_position(&self) -> String {
        format!("{}:{}", self.filename, self.line_number + 1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputMap {
    fragments: Vec<SourceFragment>,
    starting_indices: Vec<usize>,
}

impl InputMap {
    pub fn build(fragments: Vec<SourceFragment>) -> Self {
        let mut starting_indices = Vec::with_capacity(fragments.len());
        let mut next = 0usize;
        for fragment in &fragments {
            starting_indices.push(next);
            next += fragment.text.len();
        }
        Self {
            fragments,
            starting_indices,
        }
    }

    pub fn fragments(&self) -> &[SourceFragment] {
        &self.fragments
    }

    pub fn get(&self, source_id: SourceId) -> Option<&SourceFragment> {
        self.fragments.get(source_id.0 as usize)
    }

    pub fn starting_index(&self, source_id: SourceId) -> Option<usize> {
        self.starting_indices.get(source_id.0 as usize).copied()
    }

    pub fn text_len(&self) -> usize {
        self.fragments.iter().map(|fragment| fragment.text.len()).sum()
    }

    /// Fragment containing `index` and the offset local to it. The last
    /// fragment is open-ended.
    pub fn fragment_at(&self, index: usize) -> Result<(SourceId, usize), HuffError> {
        let slot = self
            .starting_indices
            .partition_point(|start| *start <= index);
        if slot == 0 {
            return Err(HuffError::OffsetOutOfRange { index });
        }
        let fragment_index = slot - 1;
        let local = index - self.starting_indices[fragment_index];
        Ok((SourceId(fragment_index as u32), local))
    }

    pub fn locate(&self, index: usize) -> Result<SourceLocation, HuffError> {
        let (source_id, local) = self.fragment_at(index)?;
        let fragment = &self.fragments[source_id.0 as usize];
        let local = local.min(fragment.text.len());
        let line_number = fragment.line_of(local);
        Ok(SourceLocation {
            filename: fragment.filename.clone(),
            line_number,
            line_text: fragment.line_text(line_number).to_string(),
        })
    }

    /// Resolves every index, reusing the previous answer for runs of equal
    /// indices.
    pub fn locate_all(&self, indices: &[usize]) -> Result<Vec<SourceLocation>, HuffError> {
        let mut out: Vec<SourceLocation> = Vec::with_capacity(indices.len());
        let mut previous: Option<usize> = None;
        for &index in indices {
            if previous == Some(index) {
                let last = out[out.len() - 1].clone();
                out.push(last);
                continue;
            }
            out.push(self.locate(index)?);
            previous = Some(index);
        }
        Ok(out)
    }

    /// Converts an absolute span to a fragment-local range, clamped to the
    /// fragment containing its start.
    pub fn resolve_span(&self, span: Span) -> Result<(SourceId, Range<usize>), HuffError> {
        let (source_id, start) = self.fragment_at(span.start)?;
        let fragment = &self.fragments[source_id.0 as usize];
        let start = start.min(fragment.text.len());
        let len = span.end.saturating_sub(span.start).max(1);
        let end = (start + len).min(fragment.text.len()).max(start);
        Ok((source_id, start..end))
    }
}
