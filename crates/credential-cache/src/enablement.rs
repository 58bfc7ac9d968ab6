//! User opt-in state for caching

/// Whether the user has opted into credential caching.
///
/// Leaves `Undecided` at most once per epoch; only a cache clear resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enablement {
    /// The user has not made a decision yet
    #[default]
    Undecided,
    Enabled,
    Disabled,
}

impl Enablement {
    pub fn is_decided(&self) -> bool {
        !matches!(self, Enablement::Undecided)
    }

    /// `Some(true)` / `Some(false)` once decided, `None` while undecided
    pub fn as_option(&self) -> Option<bool> {
        match self {
            Enablement::Undecided => None,
            Enablement::Enabled => Some(true),
            Enablement::Disabled => Some(false),
        }
    }

    /// Apply a user decision. First call wins; later calls are ignored.
    ///
    /// Returns `true` if the decision was recorded.
    pub(crate) fn decide(&mut self, enable: bool) -> bool {
        if self.is_decided() {
            return false;
        }
        *self = Enablement::from(enable);
        true
    }
}

impl From<bool> for Enablement {
    fn from(enable: bool) -> Self {
        if enable {
            Enablement::Enabled
        } else {
            Enablement::Disabled
        }
    }
}

impl From<Option<bool>> for Enablement {
    fn from(value: Option<bool>) -> Self {
        value.map(Enablement::from).unwrap_or_default()
    }
}

impl std::fmt::Display for Enablement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Enablement::Undecided => "undecided",
            Enablement::Enabled => "enabled",
            Enablement::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_decision_wins() {
        let mut state = Enablement::default();
        assert!(state.decide(false));
        assert!(!state.decide(true));
        assert_eq!(state, Enablement::Disabled);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Enablement::from(None), Enablement::Undecided);
        assert_eq!(Enablement::from(Some(true)).as_option(), Some(true));
        assert_eq!(Enablement::Disabled.as_option(), Some(false));
    }
}
