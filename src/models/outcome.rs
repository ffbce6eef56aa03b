/// Result of a stage that may degrade instead of failing.
///
/// A degraded outcome still carries a well-formed value (a placeholder,
/// an error draft or an error protocol) next to the error that caused it.
#[derive(Debug, Clone)]
pub enum Outcome<T, E> {
    Complete(T),
    Degraded { value: T, error: E },
}

impl<T, E> Outcome<T, E> {
    pub fn degraded(value: T, error: E) -> Self {
        Outcome::Degraded { value, error }
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Complete(value) | Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Outcome::Complete(value) | Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Outcome::Complete(_) => None,
            Outcome::Degraded { error, .. } => Some(error),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn into_parts(self) -> (T, Option<E>) {
        match self {
            Outcome::Complete(value) => (value, None),
            Outcome::Degraded { value, error } => (value, Some(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_keeps_value_and_error() {
        let outcome: Outcome<Vec<u8>, String> = Outcome::degraded(vec![1], "boom".to_string());
        assert!(outcome.is_degraded());
        assert_eq!(outcome.error().map(String::as_str), Some("boom"));

        let (value, error) = outcome.into_parts();
        assert_eq!(value, vec![1]);
        assert_eq!(error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_complete_has_no_error() {
        let outcome: Outcome<&str, String> = Outcome::Complete("ok");
        assert!(!outcome.is_degraded());
        assert!(outcome.error().is_none());
        assert_eq!(outcome.into_value(), "ok");
    }
}
