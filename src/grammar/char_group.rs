use super::QualifiedName;

/// The algebra character groups are composed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharGroupUnit {
    /// An inclusive range of code points, `[start, end]`.
    Sequence { start: char, end: char },
    /// Matches when any member matches.
    Union(Vec<CharGroupUnit>),
    /// Matches when every member matches.
    Intersect(Vec<CharGroupUnit>),
    /// Matches when the inner unit does not.
    Invert(Box<CharGroupUnit>),
    /// Another named group, resolved through the repository.
    Ref(QualifiedName),
}

impl CharGroupUnit {
    pub fn single(ch: char) -> Self {
        CharGroupUnit::Sequence { start: ch, end: ch }
    }

    pub fn range(start: char, end: char) -> Self {
        CharGroupUnit::Sequence { start, end }
    }

    /// Test a character against this unit. `resolve` maps a group name
    /// to its definition's unit; it is consulted for every [Ref] and may
    /// fail when the name does not resolve.
    pub fn contains<'b, F>(&self, ch: char, resolve: &F) -> Option<bool>
    where
        F: Fn(&QualifiedName) -> Option<&'b CharGroupUnit>,
    {
        match self {
            CharGroupUnit::Sequence { start, end } => Some(*start <= ch && ch <= *end),
            CharGroupUnit::Union(units) => {
                for unit in units {
                    if unit.contains(ch, resolve)? {
                        return Some(true);
                    }
                }
                Some(false)
            }
            CharGroupUnit::Intersect(units) => {
                for unit in units {
                    if !unit.contains(ch, resolve)? {
                        return Some(false);
                    }
                }
                Some(true)
            }
            CharGroupUnit::Invert(unit) => Some(!unit.contains(ch, resolve)?),
            CharGroupUnit::Ref(name) => resolve(name)?.contains(ch, resolve),
        }
    }
}

/// A named character group stored in the grammar repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharGroupDefinition {
    pub name: String,
    pub unit: CharGroupUnit,
}

impl CharGroupDefinition {
    pub fn new(name: &str, unit: CharGroupUnit) -> Self {
        Self {
            name: name.to_owned(),
            unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CharGroupUnit;

    fn no_refs(_: &super::QualifiedName) -> Option<&'static CharGroupUnit> {
        None
    }

    #[test]
    fn test_sequence_bounds() {
        let digits = CharGroupUnit::range('0', '9');
        assert_eq!(digits.contains('0', &no_refs), Some(true));
        assert_eq!(digits.contains('9', &no_refs), Some(true));
        assert_eq!(digits.contains('a', &no_refs), Some(false));
    }

    #[test]
    fn test_union_and_invert() {
        let letter = CharGroupUnit::Union(vec![
            CharGroupUnit::range('a', 'z'),
            CharGroupUnit::range('A', 'Z'),
        ]);
        assert_eq!(letter.contains('q', &no_refs), Some(true));
        assert_eq!(letter.contains('Q', &no_refs), Some(true));
        assert_eq!(letter.contains('5', &no_refs), Some(false));

        let not_letter = CharGroupUnit::Invert(Box::new(letter));
        assert_eq!(not_letter.contains('5', &no_refs), Some(true));
        assert_eq!(not_letter.contains('q', &no_refs), Some(false));
    }

    #[test]
    fn test_intersect() {
        let hex_letter = CharGroupUnit::Intersect(vec![
            CharGroupUnit::range('a', 'z'),
            CharGroupUnit::range('a', 'f'),
        ]);
        assert_eq!(hex_letter.contains('c', &no_refs), Some(true));
        assert_eq!(hex_letter.contains('g', &no_refs), Some(false));
    }

    #[test]
    fn test_unresolved_ref_propagates() {
        let unit = CharGroupUnit::Ref(super::QualifiedName::parse("root.LexerDefs.Missing"));
        assert_eq!(unit.contains('x', &no_refs), None);
    }
}
