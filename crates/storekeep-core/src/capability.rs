#![forbid(unsafe_code)]

//! Helper capabilities a managed type can declare.
//!
//! Every managed instance gets the same helper surface (timers, event
//! registration, reactions, refs, nested groups). Some helpers need a
//! collaborator supplied to the factory; a store declares the ones it relies
//! on so a missing collaborator is reported once, when the managed type is
//! built, instead of on first use.

bitflags::bitflags! {
    /// Helper capabilities requested by a store.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        const REFS       = 0b0000_0001;
        const EVENTS     = 0b0000_0010;
        const TIMERS     = 0b0000_0100;
        const COMPOSITE  = 0b0000_1000;
        const REACTIVITY = 0b0001_0000;
    }
}

impl Capabilities {
    /// Capabilities that only work when the factory holds a collaborator.
    pub const NEEDS_COLLABORATOR: Self = Self::TIMERS;

    /// Stable name of a single capability flag, for error messages and logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        if self == Self::REFS {
            "ref"
        } else if self == Self::EVENTS {
            "add_event"
        } else if self == Self::TIMERS {
            "timers"
        } else if self == Self::COMPOSITE {
            "create_composite_disposable"
        } else if self == Self::REACTIVITY {
            "reactivity"
        } else {
            "mixed"
        }
    }
}
