//! Post conditions → status functions.

use crate::ir::types::PostCondition;

/// Step-level `if:` for a post bucket appended to the same job.
pub fn step_status(condition: PostCondition) -> &'static str {
    match condition {
        PostCondition::Always | PostCondition::Cleanup | PostCondition::Changed => "always()",
        PostCondition::Success | PostCondition::Fixed => "success()",
        PostCondition::Failure | PostCondition::Regression | PostCondition::Unstable => "failure()",
        PostCondition::Aborted => "cancelled()",
        PostCondition::Unsuccessful => "failure() || cancelled()",
    }
}

/// Step-level `if:` inside a post job, judged from the results of `needs`.
pub fn needs_status(condition: PostCondition) -> &'static str {
    match condition {
        PostCondition::Always | PostCondition::Cleanup | PostCondition::Changed => "always()",
        PostCondition::Success | PostCondition::Fixed => {
            "!contains(needs.*.result, 'failure') && !contains(needs.*.result, 'cancelled')"
        }
        PostCondition::Failure | PostCondition::Regression | PostCondition::Unstable => {
            "contains(needs.*.result, 'failure')"
        }
        PostCondition::Aborted => "contains(needs.*.result, 'cancelled')",
        PostCondition::Unsuccessful => {
            "contains(needs.*.result, 'failure') || contains(needs.*.result, 'cancelled')"
        }
    }
}

/// Why a bucket only approximates Jenkins, if it does.
pub fn approximation(condition: PostCondition) -> Option<&'static str> {
    match condition {
        PostCondition::Changed => {
            Some("post `changed` compares with the previous run's result; emitted as always()")
        }
        PostCondition::Fixed => {
            Some("post `fixed` needs the previous run's result; emitted as success()")
        }
        PostCondition::Regression => {
            Some("post `regression` needs the previous run's result; emitted as failure()")
        }
        PostCondition::Unstable => {
            Some("post `unstable` has no GitHub Actions status; emitted as failure()")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_buckets_have_no_approximation() {
        for c in [
            PostCondition::Always,
            PostCondition::Success,
            PostCondition::Failure,
            PostCondition::Aborted,
            PostCondition::Unsuccessful,
            PostCondition::Cleanup,
        ] {
            assert!(approximation(c).is_none(), "{:?}", c);
        }
        assert!(approximation(PostCondition::Fixed).is_some());
    }

    #[test]
    fn unsuccessful_covers_failure_and_cancel() {
        assert_eq!(step_status(PostCondition::Unsuccessful), "failure() || cancelled()");
        assert!(needs_status(PostCondition::Unsuccessful).contains("cancelled"));
    }
}
