//! Operator confirmation.
//!
//! Destructive or long-running steps ask a [`Confirmer`] before they start.
//! The CLI backs it with an interactive prompt; tests and `--yes` runs use
//! the fixed answers below.

/// Answers yes/no questions put to the operator.
pub trait Confirmer {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Accepts every prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirmer for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Declines every prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeNo;

impl Confirmer for AssumeNo {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

impl<F> Confirmer for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_answers() {
        assert!(AssumeYes.confirm("Delete 3 issues?"));
        assert!(!AssumeNo.confirm("Delete 3 issues?"));
    }

    #[test]
    fn test_closure_confirmer() {
        let only_imports = |prompt: &str| prompt.starts_with("Import");
        assert!(only_imports.confirm("Import 10 issues?"));
        assert!(!only_imports.confirm("Delete 10 issues?"));
    }
}
