//! Node identifier
//!
//! ULID ベースの node ID。ログの span に載せて、どのプロセスがどの行を
//! 触ったかを追えるようにするためだけに使います（プロトコル上の意味はない）。
//! 所有権の判定は常に [`Token`](super::Token) で行います。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Ulid);

impl NodeId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ulid> for NodeId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_has_prefix() {
        let ulid = Ulid::from_parts(0, 1);
        let id = NodeId::from(ulid);
        assert_eq!(id.to_string(), format!("node-{ulid}"));
        assert_eq!(id.as_ulid(), ulid);
    }
}
