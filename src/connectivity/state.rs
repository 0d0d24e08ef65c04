//! Lifecycle of a connectivity group.

/// Where a group is in its lifecycle.
///
/// ```text
/// Uninitialized -> Registered -> Preprocessed -> Connected <-> Exchanging
/// Connected -> UnblankingPart1 -> UnblankingPart2 -> Connected
/// any -> Finalized
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    #[default]
    Uninitialized,
    Registered,
    Preprocessed,
    Connected,
    Exchanging,
    UnblankingPart1,
    UnblankingPart2,
    Finalized,
}

impl ConnectivityState {
    /// A committed donor set is active and may be used for exchanges.
    pub fn can_exchange(self) -> bool {
        matches!(
            self,
            ConnectivityState::Connected | ConnectivityState::UnblankingPart1
        )
    }

    /// Grids can be (re)registered.
    pub fn can_register(self) -> bool {
        self != ConnectivityState::Finalized && self != ConnectivityState::Exchanging
    }

    /// A full pass may run: after preprocessing or on top of an existing
    /// connection.
    pub fn can_connect(self) -> bool {
        matches!(
            self,
            ConnectivityState::Preprocessed | ConnectivityState::Connected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_allowed_only_with_active_donors() {
        use ConnectivityState::*;
        for s in [Uninitialized, Registered, Preprocessed, Exchanging, UnblankingPart2, Finalized] {
            assert!(!s.can_exchange(), "{s:?}");
        }
        assert!(Connected.can_exchange());
        assert!(UnblankingPart1.can_exchange());
    }

    #[test]
    fn finalized_is_terminal() {
        let s = ConnectivityState::Finalized;
        assert!(!s.can_register() && !s.can_connect() && !s.can_exchange());
    }
}
