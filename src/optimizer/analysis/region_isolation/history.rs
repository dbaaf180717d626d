//! Persistent journal of every region mutation a partition goes through.
//!
//! Nodes live in one arena per function and point at their parent, so a history handle
//! is just the id of its newest node. Copying a partition copies that id, and divergent
//! control flow paths share the tail they had in common.
//!
//! The arena handle is `Rc<RefCell<..>>` and deliberately not `Send`:
//! every parallel function check owns its own factory.

use crate::optimizer::analysis::region_isolation::partition_op::PartitionOpKind;
use crate::optimizer::analysis::region_isolation::primitives::{BlockId, Element, InstId};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::cell::RefCell;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoryNodeId(u32);

impl HistoryNodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of source level step a run of history nodes belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SequenceBoundarySemantics {
    Assign,
    AssignFresh,
    Merge,
    SingleRegion,
    SeparateRegions,
    CfgJoin,
}

impl SequenceBoundarySemantics {
    /// The boundary an evaluated op opens, if it opens one at all.
    pub fn for_op_kind(kind: PartitionOpKind) -> Option<Self> {
        match kind {
            PartitionOpKind::Assign => Some(SequenceBoundarySemantics::Assign),
            PartitionOpKind::AssignFresh => Some(SequenceBoundarySemantics::AssignFresh),
            PartitionOpKind::Merge => Some(SequenceBoundarySemantics::Merge),
            PartitionOpKind::Transfer
            | PartitionOpKind::UndoTransfer
            | PartitionOpKind::Require => None,
        }
    }
}

impl Display for SequenceBoundarySemantics {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            SequenceBoundarySemantics::Assign => "assign",
            SequenceBoundarySemantics::AssignFresh => "assign_fresh",
            SequenceBoundarySemantics::Merge => "merge",
            SequenceBoundarySemantics::SingleRegion => "single_region",
            SequenceBoundarySemantics::SeparateRegions => "separate_regions",
            SequenceBoundarySemantics::CfgJoin => "cfg_join",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryNodeKind {
    AddNewRegionForElement(Element),
    RemoveLastElementFromRegion(Element),

    // (element still in the old region, removed elements)
    RemoveElementFromRegion(Element, Vec<Element>),

    // (element whose region absorbed the others, merged elements)
    MergeElementRegions(Element, Vec<Element>),

    CfgHistoryJoin {
        joined: HistoryNodeId,
        pred_block: BlockId,
        succ_block: BlockId,
    },

    SequenceBoundary {
        semantics: SequenceBoundarySemantics,
        boundary_inst: Option<InstId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryNode {
    parent: Option<HistoryNodeId>,
    kind: HistoryNodeKind,
}

impl HistoryNode {
    pub fn parent(&self) -> Option<HistoryNodeId> {
        self.parent
    }

    pub fn kind(&self) -> &HistoryNodeKind {
        &self.kind
    }

    pub fn first_element(&self) -> Option<Element> {
        match &self.kind {
            HistoryNodeKind::AddNewRegionForElement(element)
            | HistoryNodeKind::RemoveLastElementFromRegion(element)
            | HistoryNodeKind::RemoveElementFromRegion(element, _)
            | HistoryNodeKind::MergeElementRegions(element, _) => Some(*element),
            HistoryNodeKind::CfgHistoryJoin { .. } | HistoryNodeKind::SequenceBoundary { .. } => {
                None
            }
        }
    }

    pub fn additional_elements(&self) -> &[Element] {
        match &self.kind {
            HistoryNodeKind::RemoveElementFromRegion(_, others)
            | HistoryNodeKind::MergeElementRegions(_, others) => others,
            _ => &[],
        }
    }

    pub fn joined_history(&self) -> Option<HistoryNodeId> {
        match self.kind {
            HistoryNodeKind::CfgHistoryJoin { joined, .. } => Some(joined),
            _ => None,
        }
    }

    /// (predecessor, successor) of the CFG edge a join node came through
    pub fn joined_blocks(&self) -> Option<(BlockId, BlockId)> {
        match self.kind {
            HistoryNodeKind::CfgHistoryJoin {
                pred_block,
                succ_block,
                ..
            } => Some((pred_block, succ_block)),
            _ => None,
        }
    }

    pub fn is_sequence_boundary(&self) -> bool {
        matches!(self.kind, HistoryNodeKind::SequenceBoundary { .. })
    }

    pub fn boundary_semantics(&self) -> Option<SequenceBoundarySemantics> {
        match self.kind {
            HistoryNodeKind::SequenceBoundary { semantics, .. } => Some(semantics),
            _ => None,
        }
    }

    pub fn boundary_inst(&self) -> Option<InstId> {
        match self.kind {
            HistoryNodeKind::SequenceBoundary { boundary_inst, .. } => boundary_inst,
            _ => None,
        }
    }
}

impl Display for HistoryNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            HistoryNodeKind::AddNewRegionForElement(element) => {
                write!(f, "AddNewRegionForElement: {element}")
            }
            HistoryNodeKind::RemoveLastElementFromRegion(element) => {
                write!(f, "RemoveLastElementFromRegion: {element}")
            }
            HistoryNodeKind::RemoveElementFromRegion(witness, removed) => {
                write!(f, "RemoveElementFromRegion: {witness} <- ")?;
                write_elements(f, removed)
            }
            HistoryNodeKind::MergeElementRegions(into, merged) => {
                write!(f, "MergeElementRegions: {into} <- ")?;
                write_elements(f, merged)
            }
            HistoryNodeKind::CfgHistoryJoin {
                pred_block,
                succ_block,
                ..
            } => write!(f, "CFGHistoryJoin: {pred_block} -> {succ_block}"),
            HistoryNodeKind::SequenceBoundary {
                semantics,
                boundary_inst,
            } => match boundary_inst {
                Some(inst) => write!(f, "SequenceBoundary ({semantics}) at {inst}"),
                None => write!(f, "SequenceBoundary ({semantics})"),
            },
        }
    }
}

fn write_elements(f: &mut Formatter<'_>, elements: &[Element]) -> FmtResult {
    write!(f, "[")?;
    for (index, element) in elements.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{element}")?;
    }
    write!(f, "]")
}

/// Owns the node arena for one function analysis.
/// Cloning the factory clones the handle, not the arena.
#[derive(Debug, Clone, Default)]
pub struct IsolationHistoryFactory {
    arena: Rc<RefCell<Vec<HistoryNode>>>,
}

impl IsolationHistoryFactory {
    pub fn new() -> Self {
        IsolationHistoryFactory::default()
    }

    /// A fresh, empty history backed by this arena.
    pub fn get(&self) -> IsolationHistory {
        IsolationHistory {
            head: None,
            factory: self.clone(),
        }
    }

    pub fn node(&self, id: HistoryNodeId) -> Option<HistoryNode> {
        self.arena.borrow().get(id.index()).cloned()
    }

    pub fn len(&self) -> usize {
        self.arena.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.borrow().is_empty()
    }

    pub fn same_arena(&self, other: &IsolationHistoryFactory) -> bool {
        Rc::ptr_eq(&self.arena, &other.arena)
    }

    fn alloc(&self, node: HistoryNode) -> HistoryNodeId {
        let mut arena = self.arena.borrow_mut();
        let id = HistoryNodeId(arena.len() as u32);
        arena.push(node);
        id
    }
}

/// A handle to the newest node of one history list.
#[derive(Debug, Clone)]
pub struct IsolationHistory {
    head: Option<HistoryNodeId>,
    factory: IsolationHistoryFactory,
}

// Two handles are the same history when they point at the same node
impl PartialEq for IsolationHistory {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head && self.factory.same_arena(&other.factory)
    }
}

impl IsolationHistory {
    pub fn head(&self) -> Option<HistoryNodeId> {
        self.head
    }

    pub fn factory(&self) -> &IsolationHistoryFactory {
        &self.factory
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn node(&self, id: HistoryNodeId) -> Option<HistoryNode> {
        self.factory.node(id)
    }

    /// Another handle into the same arena, starting at `head`.
    pub fn with_head(&self, head: Option<HistoryNodeId>) -> IsolationHistory {
        IsolationHistory {
            head,
            factory: self.factory.clone(),
        }
    }

    /// Number of nodes on this list, not counting joined sub histories.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Walks from the head back to the root.
    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            next: self.head,
            factory: &self.factory,
        }
    }

    fn push(&mut self, kind: HistoryNodeKind) -> HistoryNodeId {
        let id = self.factory.alloc(HistoryNode {
            parent: self.head,
            kind,
        });
        self.head = Some(id);
        id
    }

    /// Removes the head node and returns it.
    pub fn pop(&mut self) -> Option<HistoryNode> {
        let node = self.factory.node(self.head?)?;
        self.head = node.parent;
        Some(node)
    }

    /// Opens the run of nodes produced by one source level step.
    pub fn push_history_sequence_boundary(
        &mut self,
        semantics: SequenceBoundarySemantics,
        boundary_inst: Option<InstId>,
    ) -> HistoryNodeId {
        self.push(HistoryNodeKind::SequenceBoundary {
            semantics,
            boundary_inst,
        })
    }

    pub fn push_new_element_region(&mut self, element: Element) -> HistoryNodeId {
        self.push(HistoryNodeKind::AddNewRegionForElement(element))
    }

    pub fn push_remove_last_element_from_region(&mut self, element: Element) -> HistoryNodeId {
        self.push(HistoryNodeKind::RemoveLastElementFromRegion(element))
    }

    pub fn push_remove_element_from_region(
        &mut self,
        element_still_in_region: Element,
        removed: Element,
    ) -> HistoryNodeId {
        self.push(HistoryNodeKind::RemoveElementFromRegion(
            element_still_in_region,
            vec![removed],
        ))
    }

    /// Elements equal to `into` are filtered out, the rest keep their order.
    pub fn push_merge_element_regions(
        &mut self,
        into: Element,
        others: &[Element],
    ) -> HistoryNodeId {
        let merged = others
            .iter()
            .copied()
            .filter(|element| *element != into)
            .collect::<Vec<_>>();
        self.push(HistoryNodeKind::MergeElementRegions(into, merged))
    }

    pub fn push_assign_element_regions(&mut self, into: Element, from: Element) -> HistoryNodeId {
        self.push_merge_element_regions(into, &[from])
    }

    pub fn push_cfg_history_join(
        &mut self,
        joined: HistoryNodeId,
        pred_block: BlockId,
        succ_block: BlockId,
    ) -> HistoryNodeId {
        self.push(HistoryNodeKind::CfgHistoryJoin {
            joined,
            pred_block,
            succ_block,
        })
    }

    /// Renders this history and every joined sub history, newest first.
    pub fn render(&self) -> String {
        let mut output = String::new();
        let mut visited = FxHashSet::default();
        self.render_into(self.head, 0, &mut visited, &mut output);
        output
    }

    fn render_into(
        &self,
        start: Option<HistoryNodeId>,
        depth: usize,
        visited: &mut FxHashSet<HistoryNodeId>,
        output: &mut String,
    ) {
        let indent = "    ".repeat(depth);
        let mut next = start;

        while let Some(id) = next {
            if !visited.insert(id) {
                output.push_str(&format!("{indent}(shared history)\n"));
                return;
            }

            let Some(node) = self.factory.node(id) else {
                return;
            };

            output.push_str(&format!("{indent}{node}\n"));
            if let Some(joined) = node.joined_history() {
                self.render_into(Some(joined), depth + 1, visited, output);
            }

            next = node.parent;
        }
    }
}

pub struct HistoryIter<'a> {
    next: Option<HistoryNodeId>,
    factory: &'a IsolationHistoryFactory,
}

impl Iterator for HistoryIter<'_> {
    type Item = (HistoryNodeId, HistoryNode);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = self.factory.node(id)?;
        self.next = node.parent;
        Some((id, node))
    }
}
