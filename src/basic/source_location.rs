/// Identifies a source input registered with the session (a file path or
/// an interactive stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceId(pub u32);

/// Registry of source inputs known to a session, mapping ids to the
/// names used when rendering notices.
#[derive(Debug, Default)]
pub struct SourceMap {
    names: Vec<String>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str) -> SourceId {
        if let Some(index) = self.names.iter().position(|existing| existing == name) {
            return SourceId(index as u32);
        }
        self.names.push(name.to_owned());
        SourceId((self.names.len() - 1) as u32)
    }

    pub fn name(&self, id: u32) -> &str {
        self.names
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    pub fn lookup(&self, name: &str) -> Option<SourceId> {
        self.names
            .iter()
            .position(|existing| existing == name)
            .map(|index| SourceId(index as u32))
    }
}

/// A position range inside a source input.
///
/// `end_line`/`end_column` are zero when the location is a single point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct SourceLocation {
    pub source_id: u32,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceLocation {
    pub fn point(source_id: u32, line: u32, column: u32) -> Self {
        Self {
            source_id,
            line,
            column,
            end_line: 0,
            end_column: 0,
        }
    }

    pub fn span(source_id: u32, line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            source_id,
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// Smallest location covering both `self` and `other`.
    pub fn merged_with(&self, other: &SourceLocation) -> SourceLocation {
        if self.source_id != other.source_id {
            return *self;
        }
        let (start_line, start_col) = if (other.line, other.column) < (self.line, self.column) {
            (other.line, other.column)
        } else {
            (self.line, self.column)
        };
        let self_end = (self.end_line.max(self.line), self.end_column.max(self.column));
        let other_end = (
            other.end_line.max(other.line),
            other.end_column.max(other.column),
        );
        let (end_line, end_col) = self_end.max(other_end);
        SourceLocation::span(self.source_id, start_line, start_col, end_line, end_col)
    }

    /// Whether `other` lies inside this range.
    pub fn encloses(&self, other: &SourceLocation) -> bool {
        if self.source_id != other.source_id {
            return false;
        }
        let start_ok = (self.line, self.column) <= (other.line, other.column);
        let self_end = (self.end_line.max(self.line), self.end_column.max(self.column));
        let other_end = (
            other.end_line.max(other.line),
            other.end_column.max(other.column),
        );
        start_ok && other_end <= self_end
    }
}

#[cfg(test)]
mod tests {
    use super::SourceLocation;

    #[test]
    fn test_merge_extends_range() {
        let a = SourceLocation::span(0, 1, 5, 1, 9);
        let b = SourceLocation::span(0, 2, 1, 2, 4);
        let merged = a.merged_with(&b);

        assert_eq!((merged.line, merged.column), (1, 5));
        assert_eq!((merged.end_line, merged.end_column), (2, 4));
        assert!(merged.encloses(&a));
        assert!(merged.encloses(&b));
    }

    #[test]
    fn test_encloses_is_ordered() {
        let outer = SourceLocation::span(0, 1, 1, 3, 10);
        let inner = SourceLocation::span(0, 2, 3, 2, 7);
        assert!(outer.encloses(&inner));
        assert!(!inner.encloses(&outer));
    }
}
