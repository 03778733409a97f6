/// Typed-confirmation literals for destructive actions. The commit control is
/// enabled only when the user's input equals the literal exactly.
pub const CONFIRM_MOVE_TO_TRASH: &str = "Move to Trash";
pub const CONFIRM_DELETE_PERMANENTLY: &str = "Delete Permanently";
pub const CONFIRM_BLOCK: &str = "Block";

/// Exact, case-sensitive match; trailing or leading whitespace fails.
pub fn confirmation_matches(required: &str, typed: &str) -> bool {
    typed == required
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Confirming,
    Committing,
}

/// Per-action mutation flow: idle → confirming → committing → idle.
/// Destructive gates carry a required literal; non-destructive updates use
/// the same flow without one.
#[derive(Debug)]
pub struct ConfirmGate {
    required: Option<&'static str>,
    typed: String,
    phase: Phase,
}

impl ConfirmGate {
    pub fn destructive(required: &'static str) -> Self {
        ConfirmGate {
            required: Some(required),
            typed: String::new(),
            phase: Phase::Idle,
        }
    }

    pub fn simple() -> Self {
        ConfirmGate {
            required: None,
            typed: String::new(),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn begin(&mut self) {
        if self.phase == Phase::Idle {
            self.phase = Phase::Confirming;
            self.typed.clear();
        }
    }

    pub fn input(&mut self, typed: &str) {
        if self.phase == Phase::Confirming {
            self.typed = typed.to_string();
        }
    }

    pub fn can_commit(&self) -> bool {
        if self.phase != Phase::Confirming {
            return false;
        }
        match self.required {
            Some(required) => confirmation_matches(required, &self.typed),
            None => true,
        }
    }

    /// Transitions to committing only when the gate is satisfied.
    pub fn commit(&mut self) -> bool {
        if self.can_commit() {
            self.phase = Phase::Committing;
            true
        } else {
            false
        }
    }

    /// Called after the mutation round trip resolves, success or failure.
    pub fn finish(&mut self) {
        if self.phase == Phase::Committing {
            self.phase = Phase::Idle;
            self.typed.clear();
        }
    }

    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
        self.typed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_exact_literal_enables_commit() {
        let mut gate = ConfirmGate::destructive(CONFIRM_MOVE_TO_TRASH);
        gate.begin();
        for wrong in [
            "",
            "move to trash",
            "Move to trash",
            "Move to Trash ",
            " Move to Trash",
            "Move to Trash!",
        ] {
            gate.input(wrong);
            assert!(!gate.can_commit(), "accepted {:?}", wrong);
            assert!(!gate.commit());
        }
        gate.input(CONFIRM_MOVE_TO_TRASH);
        assert!(gate.can_commit());
        assert!(gate.commit());
        assert_eq!(gate.phase(), Phase::Committing);
        gate.finish();
        assert_eq!(gate.phase(), Phase::Idle);
    }

    #[test]
    fn simple_flow_commits_without_typed_input() {
        let mut gate = ConfirmGate::simple();
        assert!(!gate.commit(), "idle gate must not commit");
        gate.begin();
        assert!(gate.commit());
    }

    #[test]
    fn cancel_resets_typed_input() {
        let mut gate = ConfirmGate::destructive(CONFIRM_BLOCK);
        gate.begin();
        gate.input(CONFIRM_BLOCK);
        gate.cancel();
        gate.begin();
        assert!(!gate.can_commit());
    }

    #[test]
    fn input_is_ignored_outside_confirming() {
        let mut gate = ConfirmGate::destructive(CONFIRM_DELETE_PERMANENTLY);
        gate.input(CONFIRM_DELETE_PERMANENTLY);
        assert!(!gate.can_commit());
    }
}
