use bitflags::bitflags;

bitflags! {
    /// WebRTC state flags carried on a [`crate::model::Handle`].
    ///
    /// Monotonic in general: once a flag is set it stays set for the life
    /// of the handle. `ICE_RESTART` is the one exception — `begin_restart`
    /// clears a handful of trickle-related flags so the restart's
    /// candidates are tracked independently of the original negotiation.
    /// `CLEANING` dominates: once set, stream/component mutation should be
    /// treated as a no-op by callers (see [`StateFlags::is_cleaning`]).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct StateFlags: u32 {
        const PROCESSING_OFFER = 1 << 0;
        const START            = 1 << 1;
        const READY            = 1 << 2;
        const STOP             = 1 << 3;
        const ALERT            = 1 << 4;
        const TRICKLE          = 1 << 5;
        const ALL_TRICKLES     = 1 << 6;
        const TRICKLE_SYNCED   = 1 << 7;
        const DATA_CHANNELS    = 1 << 8;
        const CLEANING         = 1 << 9;
        const HAS_AUDIO        = 1 << 10;
        const HAS_VIDEO        = 1 << 11;
        const GOT_OFFER        = 1 << 12;
        const GOT_ANSWER       = 1 << 13;
        const HAS_AGENT        = 1 << 14;
        const ICE_RESTART      = 1 << 15;
        const RESEND_TRICKLES  = 1 << 16;
        const RFC4588_RTX      = 1 << 17;
    }
}

impl StateFlags {
    pub fn is_cleaning(&self) -> bool {
        self.contains(StateFlags::CLEANING)
    }

    pub fn is_alerted(&self) -> bool {
        self.contains(StateFlags::ALERT)
    }

    /// Invariant (b): READY -> ALERT is one-way; once ALERT is set it can
    /// never be cleared and READY must not be (re)asserted afterward.
    pub fn set_ready(&mut self) -> bool {
        if self.is_alerted() {
            return false;
        }
        self.insert(StateFlags::READY);
        true
    }

    pub fn set_alert(&mut self) {
        self.insert(StateFlags::ALERT);
        self.remove(StateFlags::READY);
    }

    /// Flags cleared when an ICE restart begins, so trickle bookkeeping
    /// for the new negotiation starts from a clean slate. `RESEND_TRICKLES`
    /// is then set so existing candidates are retransmitted to the client.
    pub fn begin_ice_restart(&mut self) {
        self.remove(
            StateFlags::ALL_TRICKLES | StateFlags::TRICKLE_SYNCED | StateFlags::TRICKLE,
        );
        self.insert(StateFlags::ICE_RESTART | StateFlags::RESEND_TRICKLES);
    }
}

impl Default for StateFlags {
    fn default() -> Self {
        StateFlags::empty()
    }
}
