//! Node lifecycle
//!
//! ```text
//! Initialized -> Joining -> Connected -> Leaving -> Disconnected -> Destroyed
//!       \__________________/^
//!        (no seeds: bootstrap)
//! ```
//!
//! Traffic is only processed while `Joining` or `Connected`.

/// Lifecycle phase of a gossip node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Lifecycle {
    /// Created, no seeds contacted yet
    #[default]
    Initialized,
    /// Hello sent to seeds, waiting for a Welcome
    Joining,
    /// At least one Welcome received (or bootstrapped as first member)
    Connected,
    /// Teardown started
    Leaving,
    /// No longer participating
    Disconnected,
    /// Event loop exits on the next tick
    Destroyed,
}

impl Lifecycle {
    /// Does this phase handle inbound and outbound protocol traffic?
    #[inline]
    pub fn accepts_traffic(self) -> bool {
        matches!(self, Lifecycle::Joining | Lifecycle::Connected)
    }

    /// Next phase on the teardown path, if any
    pub fn teardown_step(self) -> Option<Lifecycle> {
        match self {
            Lifecycle::Initialized | Lifecycle::Joining | Lifecycle::Connected => {
                Some(Lifecycle::Leaving)
            }
            Lifecycle::Leaving => Some(Lifecycle::Disconnected),
            Lifecycle::Disconnected => Some(Lifecycle::Destroyed),
            Lifecycle::Destroyed => None,
        }
    }

    #[inline]
    pub fn is_destroyed(self) -> bool {
        self == Lifecycle::Destroyed
    }
}
