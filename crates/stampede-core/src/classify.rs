//! Response classification.
//!
//! Status alone is ambiguous: a 201 on a genuine first call is correct while
//! a 201 on a scripted repeat means the idempotency guard is missing. The
//! scenario therefore tags each call with its scripted context and the
//! classifier combines both, deterministically and without side effects.

use crate::scenario::RepeatPolicy;

/// Outcome taxonomy for one request attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// 2xx on the first use of a key and payload
    Created,

    /// 2xx on a scripted repeat, read as the prior result being returned
    Replayed,

    /// 202, accepted but not yet finalized
    InProgress,

    /// Policy rejection or payload mismatch (400, 409, 422)
    Conflict,

    /// A repeat call that behaved like a fresh creation
    DuplicateSuspect,

    /// 5xx
    ServerError,

    /// The request never completed (connect failure, timeout)
    NetworkError,

    /// Status outside the known taxonomy
    Other,
}

impl Outcome {
    pub const COUNT: usize = 8;

    pub const ALL: [Outcome; Outcome::COUNT] = [
        Outcome::Created,
        Outcome::Replayed,
        Outcome::InProgress,
        Outcome::Conflict,
        Outcome::DuplicateSuspect,
        Outcome::ServerError,
        Outcome::NetworkError,
        Outcome::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Replayed => "replayed",
            Outcome::InProgress => "in_progress",
            Outcome::Conflict => "conflict",
            Outcome::DuplicateSuspect => "duplicate_suspect",
            Outcome::ServerError => "server_error",
            Outcome::NetworkError => "network_error",
            Outcome::Other => "other",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Counts against the failure-rate threshold
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::ServerError | Outcome::NetworkError)
    }
}

/// Scripted context for one call
#[derive(Clone, Copy, Debug)]
pub struct CallContext {
    /// This call repeats a key the run has already used
    pub expect_repeat: bool,

    /// The payload matches the first use of the key
    pub same_payload: bool,
}

impl CallContext {
    pub fn first() -> Self {
        Self {
            expect_repeat: false,
            same_payload: true,
        }
    }

    pub fn repeat() -> Self {
        Self {
            expect_repeat: true,
            same_payload: true,
        }
    }

    pub fn mismatched_repeat() -> Self {
        Self {
            expect_repeat: true,
            same_payload: false,
        }
    }
}

/// Map a response status onto the outcome taxonomy. `None` means the request
/// never completed.
pub fn classify(status: Option<u16>, ctx: CallContext, policy: RepeatPolicy) -> Outcome {
    let Some(status) = status else {
        return Outcome::NetworkError;
    };
    match status {
        200 | 201 => {
            if !ctx.expect_repeat {
                Outcome::Created
            } else if !ctx.same_payload {
                // success where the payload contract demanded a conflict
                Outcome::DuplicateSuspect
            } else {
                match policy {
                    RepeatPolicy::FlagDuplicate => Outcome::DuplicateSuspect,
                    RepeatPolicy::AcceptReplay => Outcome::Replayed,
                }
            }
        }
        202 => Outcome::InProgress,
        400 | 409 | 422 => Outcome::Conflict,
        500..=599 => Outcome::ServerError,
        _ => Outcome::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_use_success_is_created() {
        for status in [200, 201] {
            assert_eq!(
                classify(Some(status), CallContext::first(), RepeatPolicy::FlagDuplicate),
                Outcome::Created
            );
        }
    }

    #[test]
    fn test_repeat_success_follows_policy() {
        assert_eq!(
            classify(Some(201), CallContext::repeat(), RepeatPolicy::FlagDuplicate),
            Outcome::DuplicateSuspect
        );
        assert_eq!(
            classify(Some(200), CallContext::repeat(), RepeatPolicy::AcceptReplay),
            Outcome::Replayed
        );
    }

    #[test]
    fn test_mismatched_repeat_success_is_suspect_under_both_policies() {
        for policy in [RepeatPolicy::FlagDuplicate, RepeatPolicy::AcceptReplay] {
            assert_eq!(
                classify(Some(201), CallContext::mismatched_repeat(), policy),
                Outcome::DuplicateSuspect
            );
        }
    }

    #[test]
    fn test_accepted_is_in_progress_regardless_of_context() {
        assert_eq!(
            classify(Some(202), CallContext::first(), RepeatPolicy::FlagDuplicate),
            Outcome::InProgress
        );
        assert_eq!(
            classify(Some(202), CallContext::repeat(), RepeatPolicy::AcceptReplay),
            Outcome::InProgress
        );
    }

    #[test]
    fn test_policy_rejections_are_conflicts() {
        for status in [400, 409, 422] {
            assert_eq!(
                classify(Some(status), CallContext::mismatched_repeat(), RepeatPolicy::FlagDuplicate),
                Outcome::Conflict
            );
        }
    }

    #[test]
    fn test_server_errors() {
        for status in [500, 502, 599] {
            assert_eq!(
                classify(Some(status), CallContext::first(), RepeatPolicy::FlagDuplicate),
                Outcome::ServerError
            );
        }
    }

    #[test]
    fn test_transport_failure_is_network_error() {
        assert_eq!(
            classify(None, CallContext::first(), RepeatPolicy::FlagDuplicate),
            Outcome::NetworkError
        );
    }

    #[test]
    fn test_unknown_statuses_are_other() {
        for status in [204, 301, 403, 418] {
            assert_eq!(
                classify(Some(status), CallContext::first(), RepeatPolicy::FlagDuplicate),
                Outcome::Other
            );
        }
    }

    #[test]
    fn test_outcome_index_covers_all_variants() {
        for (i, outcome) in Outcome::ALL.iter().enumerate() {
            assert_eq!(outcome.index(), i);
        }
    }
}
