use std::collections::BTreeSet;

/// What changed between two observations of a tracked set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// In the current observation only
    pub added: BTreeSet<String>,
    /// In the previous observation only
    pub removed: BTreeSet<String>,
}

impl Reconciliation {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn reconcile(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Reconciliation {
    Reconciliation {
        added: current.difference(previous).cloned().collect(),
        removed: previous.difference(current).cloned().collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_reconcile() {
        let res = reconcile(&set(&["A", "B", "C"]), &set(&["B", "C", "D", "E"]));
        assert_eq!(res.added, set(&["D", "E"]));
        assert_eq!(res.removed, set(&["A"]));
        assert!(!res.is_unchanged());
    }

    #[test]
    fn test_reconcile_same() {
        let codes = set(&["ABC123", "XYZ999"]);
        let res = reconcile(&codes, &codes);
        assert!(res.is_unchanged());
        assert_eq!(res, Reconciliation::default());
    }

    #[test]
    fn test_reconcile_from_empty() {
        let res = reconcile(&BTreeSet::new(), &set(&["X"]));
        assert_eq!(res.added, set(&["X"]));
        assert!(res.removed.is_empty());

        let res = reconcile(&set(&["X"]), &BTreeSet::new());
        assert!(res.added.is_empty());
        assert_eq!(res.removed, set(&["X"]));
    }
}
