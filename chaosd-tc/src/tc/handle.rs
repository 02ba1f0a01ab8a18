//! TC handles and parent references.
//!
//! TC handles are 32-bit values split into major:minor (16:16 bits). A qdisc always has a
//! zero minor, classes of a classful qdisc share its major.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle {
    pub major: u16,
    pub minor: u16,
}

impl Handle {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// The handle of a qdisc, `<major>:`.
    pub const fn qdisc(major: u16) -> Self {
        Self::new(major, 0)
    }

    /// The handle of class `minor` of qdisc `major`, e.g. a PRIO band.
    pub const fn class(major: u16, minor: u16) -> Self {
        Self::new(major, minor)
    }

    /// The 32-bit value used by the kernel.
    ///
    /// ```
    /// use chaosd_tc::Handle;
    /// assert_eq!(Handle::class(3, 4).as_u32(), 0x0003_0004);
    /// ```
    pub const fn as_u32(self) -> u32 {
        (self.major as u32) << 16 | self.minor as u32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minor == 0 {
            write!(f, "{}:", self.major)
        } else {
            write!(f, "{}:{}", self.major, self.minor)
        }
    }
}

/// Where a qdisc or filter attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parent {
    Root,
    Handle(Handle),
}

impl Parent {
    /// The parent of the next qdisc of a linear chain whose last qdisc has major `major`.
    /// Zero means nothing has been created yet, so the chain starts at the root.
    pub const fn from_major(major: u16) -> Self {
        if major == 0 {
            Self::Root
        } else {
            Self::Handle(Handle::qdisc(major))
        }
    }

    /// The parent of a generic qdisc request, where an absent parent and `1:0` both mean root.
    pub fn from_request(parent: Option<Handle>) -> Self {
        match parent {
            None => Self::Root,
            Some(handle) if handle == Handle::qdisc(1) => Self::Root,
            Some(handle) => Self::Handle(handle),
        }
    }

    /// The `tc` arguments selecting this parent.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Root => vec!["root".to_string()],
            Self::Handle(handle) => vec!["parent".to_string(), handle.to_string()],
        }
    }
}

impl From<Handle> for Parent {
    fn from(handle: Handle) -> Self {
        Self::Handle(handle)
    }
}

impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Handle(handle) => write!(f, "parent {handle}"),
        }
    }
}
