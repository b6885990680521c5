use serde::{Deserialize, Serialize};

/// Exit code when every check passed.
pub const EXIT_PASS: i32 = 0;
/// Exit code when the target answered but at least one check failed.
pub const EXIT_FAIL: i32 = 1;
/// Exit code when the target could not be reached at all.
pub const EXIT_UNREACHABLE: i32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Pass => EXIT_PASS,
            Outcome::Fail => EXIT_FAIL,
        }
    }
}

/// An empty check list is a failure: nothing was verified.
pub fn classify_outcome(checks: &[CheckResult]) -> Outcome {
    if !checks.is_empty() && checks.iter().all(|check| check.passed) {
        Outcome::Pass
    } else {
        Outcome::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(passed: bool) -> CheckResult {
        CheckResult {
            name: "reset".to_string(),
            passed,
            detail: String::new(),
        }
    }

    #[test]
    fn pass_when_every_check_passes() {
        assert_eq!(classify_outcome(&[check(true), check(true)]), Outcome::Pass);
    }

    #[test]
    fn fail_when_any_check_fails() {
        assert_eq!(classify_outcome(&[check(true), check(false)]), Outcome::Fail);
    }

    #[test]
    fn fail_when_nothing_was_checked() {
        assert_eq!(classify_outcome(&[]), Outcome::Fail);
        assert_eq!(Outcome::Fail.exit_code(), EXIT_FAIL);
    }
}
