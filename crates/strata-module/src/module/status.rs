//! Module lifecycle status
//!
//! Engines report status as a raw numeric code. The wrapper maps it onto
//! [`ModuleStatus`] through an exhaustive table and never hands the raw form
//! back out.

use std::fmt;

/// Raw status code as reported by an engine.
pub type RawStatus = i32;

/// Raw status codes engines must report, one per [`ModuleStatus`].
pub mod raw {
    use super::RawStatus;

    /// Not yet instantiated.
    pub const UNINSTANTIATED: RawStatus = 0;
    /// Instantiation in progress.
    pub const INSTANTIATING: RawStatus = 1;
    /// Instantiated, ready to evaluate.
    pub const INSTANTIATED: RawStatus = 2;
    /// Evaluation in progress.
    pub const EVALUATING: RawStatus = 3;
    /// Evaluation finished.
    pub const EVALUATED: RawStatus = 4;
    /// Instantiation or evaluation failed.
    pub const ERRORED: RawStatus = 5;
}

const STATUS_TABLE: [(RawStatus, ModuleStatus); 6] = [
    (raw::UNINSTANTIATED, ModuleStatus::Unlinked),
    (raw::INSTANTIATING, ModuleStatus::Linking),
    (raw::INSTANTIATED, ModuleStatus::Linked),
    (raw::EVALUATING, ModuleStatus::Evaluating),
    (raw::EVALUATED, ModuleStatus::Evaluated),
    (raw::ERRORED, ModuleStatus::Errored),
];

/// Logical lifecycle status of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleStatus {
    /// Constructed, no bindings supplied yet
    Unlinked,
    /// Bindings supplied, waiting for the rest of the graph
    Linking,
    /// Whole reachable graph instantiated
    Linked,
    /// Evaluation in progress
    Evaluating,
    /// Evaluation completed successfully
    Evaluated,
    /// Terminal failure state
    Errored,
}

impl ModuleStatus {
    /// Map a raw engine code onto a logical status.
    pub fn from_raw(code: RawStatus) -> Option<Self> {
        STATUS_TABLE
            .iter()
            .find(|(raw, _)| *raw == code)
            .map(|(_, status)| *status)
    }

    /// The raw code for this status. Engines use this to report status.
    pub fn to_raw(self) -> RawStatus {
        match self {
            ModuleStatus::Unlinked => raw::UNINSTANTIATED,
            ModuleStatus::Linking => raw::INSTANTIATING,
            ModuleStatus::Linked => raw::INSTANTIATED,
            ModuleStatus::Evaluating => raw::EVALUATING,
            ModuleStatus::Evaluated => raw::EVALUATED,
            ModuleStatus::Errored => raw::ERRORED,
        }
    }

    /// Lower-case name, e.g. `"linked"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleStatus::Unlinked => "unlinked",
            ModuleStatus::Linking => "linking",
            ModuleStatus::Linked => "linked",
            ModuleStatus::Evaluating => "evaluating",
            ModuleStatus::Evaluated => "evaluated",
            ModuleStatus::Errored => "errored",
        }
    }

    /// True for `linked`, `evaluating` and `evaluated`.
    pub fn is_instantiated(self) -> bool {
        matches!(
            self,
            ModuleStatus::Linked | ModuleStatus::Evaluating | ModuleStatus::Evaluated
        )
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_table_is_one_to_one() {
        for (code, status) in STATUS_TABLE {
            assert_eq!(ModuleStatus::from_raw(code), Some(status));
            assert_eq!(status.to_raw(), code);
        }
    }

    #[test]
    fn test_unknown_raw_code() {
        assert_eq!(ModuleStatus::from_raw(6), None);
        assert_eq!(ModuleStatus::from_raw(-1), None);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ModuleStatus::Unlinked.to_string(), "unlinked");
        assert_eq!(ModuleStatus::Errored.to_string(), "errored");
    }

    #[test]
    fn test_is_instantiated() {
        assert!(!ModuleStatus::Unlinked.is_instantiated());
        assert!(!ModuleStatus::Linking.is_instantiated());
        assert!(ModuleStatus::Linked.is_instantiated());
        assert!(ModuleStatus::Evaluated.is_instantiated());
        assert!(!ModuleStatus::Errored.is_instantiated());
    }
}
