//! Id newtypes shared by every part of the region isolation checker.
//!
//! Elements and instructions are allocated by whoever lowers a function into partition ops.
//! Regions are the only ids the checker mints itself.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// One tracked value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Element(pub u32);

/// One partition bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstId(pub u32);

/// The `index`th operand of the instruction `user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperandId {
    pub user: InstId,
    pub index: u32,
}

impl OperandId {
    pub fn new(user: InstId, index: u32) -> Self {
        OperandId { user, index }
    }
}

impl Element {
    /// Largest trackable id. One region id above every element has to stay free.
    pub const MAX: Element = Element(u32::MAX - 1);
}

impl Region {
    /// None once region ids are exhausted.
    pub(crate) fn next(self) -> Option<Region> {
        self.0.checked_add(1).map(Region)
    }
}

// A canonical region is named after its smallest element
impl From<Element> for Region {
    fn from(element: Element) -> Self {
        Region(element.0)
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "%%{}", self.0)
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "r{}", self.0)
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "bb{}", self.0)
    }
}

impl Display for InstId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "inst{}", self.0)
    }
}

impl Display for OperandId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}#{}", self.user, self.index)
    }
}
