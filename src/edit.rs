//! Byte-offset transformations, the atomic unit of every rewrite.
//!
//! Rules accumulate transformations into a pass-scoped set that rejects
//! overlap on insertion and applies bottom-up, so earlier offsets stay
//! valid while later ones are rewritten. Abutting is fine; overlapping is
//! a bug in the producing rule and surfaces as a structured error.

use crate::error::Error;

/// "Within `[start, end)`, place exactly `replacement`." A zero-width span
/// is a pure insertion.
#[derive(Debug, Clone)]
pub struct Transformation {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
    /// Tie-break for same-offset insertions; lower applies first.
    pub priority: i32,
    pub rule_id: String,
}

impl Transformation {
    pub fn replace(rule_id: &str, start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
            priority: 0,
            rule_id: rule_id.to_string(),
        }
    }

    pub fn insert(rule_id: &str, at: usize, text: impl Into<String>) -> Self {
        Self::replace(rule_id, at, at, text)
    }

    pub fn delete(rule_id: &str, start: usize, end: usize) -> Self {
        Self::replace(rule_id, start, end, "")
    }

    fn overlaps(&self, other: &Transformation) -> bool {
        // Half-open intervals: abutting is allowed, and two zero-width
        // insertions may share an offset (priority orders them).
        if self.start == self.end || other.start == other.end {
            return false;
        }
        self.start < other.end && other.start < self.end
    }
}

/// A validated, pass-scoped batch of transformations.
#[derive(Debug, Default)]
pub struct TransformationSet {
    items: Vec<Transformation>,
}

impl TransformationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Transformation] {
        &self.items
    }

    /// Rule ids that contributed at least one transformation, in insertion
    /// order without duplicates.
    pub fn rule_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for item in &self.items {
            if !ids.contains(&item.rule_id) {
                ids.push(item.rule_id.clone());
            }
        }
        ids
    }

    /// Add one transformation, rejecting interval overlap with anything
    /// already accepted.
    ///
    /// # Errors
    ///
    /// Returns `Error::OverlappingTransformations` naming the offender.
    pub fn push(&mut self, t: Transformation) -> Result<(), Error> {
        if let Some(existing) = self.items.iter().find(|e| e.overlaps(&t)) {
            return Err(Error::OverlappingTransformations {
                rule_id: t.rule_id.clone(),
                start: t.start.max(existing.start),
                end: t.end.min(existing.end),
            });
        }
        self.items.push(t);
        Ok(())
    }

    /// Add a whole batch atomically: either all fit or none are added.
    ///
    /// # Errors
    ///
    /// Returns the first overlap found; the set is left unchanged.
    pub fn push_all(&mut self, batch: Vec<Transformation>) -> Result<(), Error> {
        let checkpoint = self.items.len();
        for t in batch {
            if let Err(e) = self.push(t) {
                self.items.truncate(checkpoint);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Apply the set to a buffer: sort by `(start, priority)`, then rewrite
    /// bottom-up so byte offsets never shift under later items.
    pub fn apply(mut self, source: &str) -> String {
        self.items
            .sort_by(|a, b| (a.start, a.priority).cmp(&(b.start, b.priority)));

        let mut out = source.to_string();
        for t in self.items.iter().rev() {
            out.replace_range(t.start..t.end, &t.replacement);
        }
        out
    }
}
