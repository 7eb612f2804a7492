//! Complexity dial controlling the magnitude of generated values.

use serde::Serialize;

/// A bounded dial in `[0, 8]` that scales generated values.
///
/// Level 0 is reserved for fixed pools (simple and edge cases) whose size
/// does not depend on the dial. Random generation starts at [`Complexity::MIN`]
/// and ratchets upward after successful steps; shrinking walks back down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Complexity {
    level: u8,
}

impl Complexity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 8;

    /// Complexity reserved for fixed values and empty argument lists.
    pub const ZERO: Complexity = Complexity { level: 0 };

    /// Creates a complexity at `level`, clamped into `[0, MAX]`.
    pub fn new(level: u8) -> Complexity {
        Complexity {
            level: level.min(Self::MAX),
        }
    }

    pub fn level(self) -> u8 {
        self.level
    }

    /// Steps up one level, saturating at [`Complexity::MAX`].
    #[must_use]
    pub fn next(self) -> Complexity {
        Complexity {
            level: (self.level + 1).min(Self::MAX),
        }
    }

    /// Steps down one level, saturating at [`Complexity::MIN`].
    #[must_use]
    pub fn prev(self) -> Complexity {
        Complexity {
            level: self.level.saturating_sub(1).max(Self::MIN),
        }
    }

    /// `base ^ level`, the magnitude window for numeric generation.
    ///
    /// The widest case, `16 ^ 8`, still fits comfortably in an `i64`.
    pub fn power(self, base: u32) -> i64 {
        (base as i64).pow(self.level as u32)
    }

    /// Every level from [`Complexity::MIN`] through [`Complexity::MAX`].
    pub fn all() -> impl Iterator<Item = Complexity> {
        (Self::MIN..=Self::MAX).map(|level| Complexity { level })
    }
}

impl Default for Complexity {
    fn default() -> Complexity {
        Complexity { level: Self::MIN }
    }
}
