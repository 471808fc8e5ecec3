//! Matching of modification ignore lists.

/// How ignore list entries are matched against the modification text of a record
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IgnoreMatch {
    /// The entry has to be followed by a space, so `Ox` does not match `Oxidation 3`
    TokenBoundary,
    /// Plain substring match
    Substring,
}

impl IgnoreMatch {
    /// If any (non empty) ignore list entry matches the modification text
    pub fn is_ignored(self, modifications: &str, ignore_list: &[String]) -> bool {
        ignore_list
            .iter()
            .map(|token| token.trim())
            .filter(|token| !token.is_empty())
            .any(|token| match self {
                Self::TokenBoundary => modifications.contains(&format!("{token} ")),
                Self::Substring => modifications.contains(token),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn token_boundary() {
        let m = IgnoreMatch::TokenBoundary;
        assert!(m.is_ignored("Ox 3 ", &list(&["Ox"])));
        assert!(!m.is_ignored("Ox 3 ", &list(&["Ph"])));
        assert!(!m.is_ignored("Oxidation 3", &list(&["Ox"])));
        assert!(m.is_ignored("Oxidation 3,Phospho 5", &list(&["Phospho"])));
        assert!(!m.is_ignored("Ox 3", &list(&[""])));
    }

    #[test]
    fn substring() {
        let m = IgnoreMatch::Substring;
        assert!(m.is_ignored("PEPM[Oxidation]TIDE", &list(&["Ox"])));
        assert!(!m.is_ignored("PEPTIDE", &list(&["Ox"])));
        assert!(!m.is_ignored("PEPTIDE", &[]));
    }
}
