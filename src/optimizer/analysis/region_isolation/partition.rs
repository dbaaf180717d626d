//! The element to region mapping at one program point.
//!
//! A partition groups tracked elements into disjoint regions, remembers which regions
//! were transferred away (and by which operands) and journals every mutation into its
//! `IsolationHistory`. Region ids are only meaningful inside one partition until it is
//! canonicalized, after which every region is named after its smallest element.

use crate::optimizer::analysis::region_isolation::history::{
    HistoryNodeId, IsolationHistory, SequenceBoundarySemantics,
};
use crate::optimizer::analysis::region_isolation::primitives::{
    BlockId, Element, InstId, OperandId, Region,
};
use crate::optimizer::analysis::region_isolation::types::{
    PartitionSnapshot, TransferredRegionSnapshot,
};
use crate::optimizer::compiler_messages::compiler_errors::{CompilerError, ErrorLocation};
use crate::return_compiler_error;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::cell::RefCell;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::rc::{Rc, Weak};

type InternTable = FxHashMap<Vec<OperandId>, TransferringOperandSet>;

/// Immutable, sorted set of the operands that transferred a region.
/// Sets are shared between partition copies instead of being copied.
/// A set made by a factory interns its unions through that factory.
#[derive(Debug, Clone)]
pub struct TransferringOperandSet {
    operands: Rc<[OperandId]>,
    factory: Option<Weak<RefCell<InternTable>>>,
}

impl PartialEq for TransferringOperandSet {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.operands, &other.operands) || self.operands == other.operands
    }
}

impl Eq for TransferringOperandSet {}

impl TransferringOperandSet {
    // Callers must pass a sorted, deduplicated, non-empty list
    fn from_sorted(operands: Vec<OperandId>) -> Self {
        TransferringOperandSet {
            operands: operands.into(),
            factory: None,
        }
    }

    pub fn single(operand: OperandId) -> Self {
        TransferringOperandSet::from_sorted(vec![operand])
    }

    pub fn iter(&self) -> impl Iterator<Item = OperandId> + '_ {
        self.operands.iter().copied()
    }

    pub fn as_slice(&self) -> &[OperandId] {
        &self.operands
    }

    pub fn len(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    pub fn contains(&self, operand: OperandId) -> bool {
        self.operands.binary_search(&operand).is_ok()
    }

    pub fn shares_allocation(&self, other: &TransferringOperandSet) -> bool {
        Rc::ptr_eq(&self.operands, &other.operands)
    }

    /// Union of both sets. Reuses either side when the other adds nothing,
    /// otherwise interns the union in the factory of either side.
    pub fn merge(&self, other: &TransferringOperandSet) -> TransferringOperandSet {
        if self.shares_allocation(other) || other.iter().all(|operand| self.contains(operand)) {
            return self.clone();
        }
        if self.iter().all(|operand| other.contains(operand)) {
            return other.clone();
        }

        let mut operands = self.operands.to_vec();
        operands.extend(other.iter());

        let table = [&self.factory, &other.factory]
            .into_iter()
            .flatten()
            .find_map(Weak::upgrade);

        match table {
            Some(table) => intern(&table, operands),
            None => {
                operands.sort();
                operands.dedup();
                TransferringOperandSet::from_sorted(operands)
            }
        }
    }
}

/// Interns operand sets by content, so identical sets share one allocation.
#[derive(Debug, Default)]
pub struct TransferringOperandSetFactory {
    interned: Rc<RefCell<InternTable>>,
}

impl TransferringOperandSetFactory {
    pub fn new() -> Self {
        TransferringOperandSetFactory::default()
    }

    pub fn get(&mut self, operand: OperandId) -> TransferringOperandSet {
        intern(&self.interned, vec![operand])
    }

    /// Returns None for an empty list, transferred sets are never empty.
    pub fn get_set(&mut self, operands: &[OperandId]) -> Option<TransferringOperandSet> {
        if operands.is_empty() {
            return None;
        }

        Some(intern(&self.interned, operands.to_vec()))
    }

    pub fn merge(
        &mut self,
        lhs: &TransferringOperandSet,
        rhs: &TransferringOperandSet,
    ) -> TransferringOperandSet {
        let mut operands = lhs.as_slice().to_vec();
        operands.extend(rhs.iter());
        intern(&self.interned, operands)
    }

    pub fn len(&self) -> usize {
        self.interned.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.interned.borrow().is_empty()
    }
}

fn intern(
    table: &Rc<RefCell<InternTable>>,
    mut operands: Vec<OperandId>,
) -> TransferringOperandSet {
    operands.sort();
    operands.dedup();

    if let Some(existing) = table.borrow().get(&operands) {
        return existing.clone();
    }

    let set = TransferringOperandSet {
        operands: operands.clone().into(),
        factory: Some(Rc::downgrade(table)),
    };
    table.borrow_mut().insert(operands, set.clone());
    set
}

#[derive(Debug, Clone)]
pub struct Partition {
    // Ordered so canonicalization and iteration are deterministic
    element_to_region: BTreeMap<Element, Region>,
    region_to_transferred_operands: BTreeMap<Region, TransferringOperandSet>,

    // Strictly greater than every region in use
    fresh_label: Region,

    history: IsolationHistory,

    // Every region is named after its smallest element
    canonical: bool,
}

impl Partition {
    pub fn new(history: IsolationHistory) -> Self {
        Partition {
            element_to_region: BTreeMap::new(),
            region_to_transferred_operands: BTreeMap::new(),
            fresh_label: Region(0),
            history,
            canonical: true,
        }
    }

    /// A partition where every element in `elements` shares one region.
    pub fn single_region(
        boundary_inst: Option<InstId>,
        elements: &[Element],
        history: IsolationHistory,
    ) -> Result<Self, CompilerError> {
        check_trackable(elements)?;

        let mut partition = Partition::new(history);
        partition.push_history_sequence_boundary(
            SequenceBoundarySemantics::SingleRegion,
            boundary_inst,
        );

        let elements = sorted_unique(elements);
        let (Some(&first), Some(&last)) = (elements.first(), elements.last()) else {
            return Ok(partition);
        };

        let region = Region::from(first);
        for element in &elements {
            partition.element_to_region.insert(*element, region);
        }
        partition.fresh_label = label_above(last);

        partition.history.push_new_element_region(first);
        if elements.len() > 1 {
            partition
                .history
                .push_merge_element_regions(first, &elements[1..]);
        }

        debug_assert!(partition.is_canonical_correct());
        Ok(partition)
    }

    /// A partition where every element in `elements` has its own region.
    pub fn separate_regions(
        boundary_inst: Option<InstId>,
        elements: &[Element],
        history: IsolationHistory,
    ) -> Result<Self, CompilerError> {
        check_trackable(elements)?;

        let mut partition = Partition::new(history);
        partition.push_history_sequence_boundary(
            SequenceBoundarySemantics::SeparateRegions,
            boundary_inst,
        );

        for element in sorted_unique(elements) {
            partition
                .element_to_region
                .insert(element, Region::from(element));
            partition.history.push_new_element_region(element);
            partition.fresh_label = label_above(element);
        }

        debug_assert!(partition.is_canonical_correct());
        Ok(partition)
    }

    pub fn is_tracking_element(&self, element: Element) -> bool {
        self.element_to_region.contains_key(&element)
    }

    pub fn region(&self, element: Element) -> Option<Region> {
        self.element_to_region.get(&element).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Element, Region)> + '_ {
        self.element_to_region
            .iter()
            .map(|(element, region)| (*element, *region))
    }

    pub fn len(&self) -> usize {
        self.element_to_region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.element_to_region.is_empty()
    }

    pub fn elements_in_region(&self, region: Region) -> Vec<Element> {
        self.iter()
            .filter(|(_, element_region)| *element_region == region)
            .map(|(element, _)| element)
            .collect()
    }

    /// Every region as a sorted element list, ordered by smallest element.
    pub fn regions(&self) -> Vec<Vec<Element>> {
        let mut by_region: BTreeMap<Region, Vec<Element>> = BTreeMap::new();
        for (element, region) in self.iter() {
            by_region.entry(region).or_default().push(element);
        }

        let mut regions = by_region.into_values().collect::<Vec<_>>();
        regions.sort_by_key(|elements| elements.first().copied());
        regions
    }

    /// False if either element is untracked.
    pub fn are_elements_in_same_region(&self, first: Element, second: Element) -> bool {
        match (self.region(first), self.region(second)) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => false,
        }
    }

    pub fn is_transferred(&self, element: Element) -> bool {
        self.transferred(element).is_some()
    }

    pub fn transferred(&self, element: Element) -> Option<&TransferringOperandSet> {
        let region = self.region(element)?;
        self.region_to_transferred_operands.get(&region)
    }

    pub fn transferred_elements(&self) -> Vec<Element> {
        self.iter()
            .filter(|(_, region)| self.region_to_transferred_operands.contains_key(region))
            .map(|(element, _)| element)
            .collect()
    }

    pub fn isolation_history(&self) -> &IsolationHistory {
        &self.history
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    pub fn fresh_label(&self) -> Region {
        self.fresh_label
    }

    pub fn push_history_sequence_boundary(
        &mut self,
        semantics: SequenceBoundarySemantics,
        boundary_inst: Option<InstId>,
    ) -> HistoryNodeId {
        self.history
            .push_history_sequence_boundary(semantics, boundary_inst)
    }

    /// Stops tracking `element` without recording anything. Used when rewinding history.
    pub(crate) fn forget_element(&mut self, element: Element) {
        self.detach_element(element, false);
        self.canonical = false;
    }

    /// Marks the region of `element` as transferred by `operands`.
    /// An untracked element is tracked in a new region first.
    pub fn mark_transferred(
        &mut self,
        element: Element,
        operands: TransferringOperandSet,
    ) -> Result<(), CompilerError> {
        let region = match self.region(element) {
            Some(region) => region,
            None => self.track_new_element(element, true)?,
        };

        self.add_transferred_operands(region, &operands);
        Ok(())
    }

    /// Returns whether the region of `element` was transferred before this call.
    pub fn undo_transfer(&mut self, element: Element) -> bool {
        let Some(region) = self.region(element) else {
            return false;
        };

        self.region_to_transferred_operands.remove(&region).is_some()
    }

    pub fn clear_transfer_state(&mut self) {
        self.region_to_transferred_operands.clear();
    }

    /// A copy with the same regions and history but nothing transferred.
    pub fn removing_transfer_state(&self) -> Partition {
        let mut partition = self.clone();
        partition.clear_transfer_state();
        partition
    }

    /// Puts `element` in a brand new singleton region, detaching it from its old region first.
    /// Returns the new region. Fails without changing anything once region ids run out.
    pub fn track_new_element(
        &mut self,
        element: Element,
        update_history: bool,
    ) -> Result<Region, CompilerError> {
        check_trackable(&[element])?;

        let region = self.fresh_label;
        let Some(next_label) = region.next() else {
            return_compiler_error!(
                format!("Ran out of region ids while tracking {element}"),
                ErrorLocation::default(),
                {
                    CompilationStage => "Region Isolation",
                    Element => element.to_string(),
                }
            );
        };

        self.detach_element(element, update_history);
        self.element_to_region.insert(element, region);
        self.fresh_label = next_label;
        if update_history {
            self.history.push_new_element_region(element);
        }

        self.canonical = false;
        Ok(region)
    }

    /// Makes `old_element` share the region of `new_element`.
    pub fn assign_element(
        &mut self,
        old_element: Element,
        new_element: Element,
        update_history: bool,
    ) -> Result<(), CompilerError> {
        let Some(new_region) = self.region(new_element) else {
            return_compiler_error!(
                format!("Cannot assign {old_element} from untracked element {new_element}"),
                ErrorLocation::default(),
                {
                    CompilationStage => "Region Isolation",
                    Element => new_element.to_string(),
                }
            );
        };

        self.assign_element_to_region(old_element, new_element, new_region, update_history)
    }

    /// Unions the regions of two tracked elements and returns the surviving region.
    pub fn merge(
        &mut self,
        fst: Element,
        snd: Element,
        update_history: bool,
    ) -> Result<Region, CompilerError> {
        let (Some(fst_region), Some(snd_region)) = (self.region(fst), self.region(snd)) else {
            let untracked = if self.is_tracking_element(fst) { snd } else { fst };
            return_compiler_error!(
                format!("Cannot merge {fst} and {snd}: {untracked} is not tracked"),
                ErrorLocation::default(),
                {
                    CompilationStage => "Region Isolation",
                    Element => untracked.to_string(),
                }
            );
        };

        Ok(self.merge_regions(fst, fst_region, snd, snd_region, update_history))
    }

    /// Renames every region after its smallest element.
    pub fn canonicalize(&mut self) {
        if self.canonical {
            return;
        }
        self.canonical = true;

        // Elements are visited in ascending order,
        // so the first element seen in a region is its smallest one
        let mut renamed: FxHashMap<Region, Region> = FxHashMap::default();
        for (element, region) in self.element_to_region.iter_mut() {
            let canonical = *renamed.entry(*region).or_insert(Region::from(*element));
            *region = canonical;
        }

        let transferred = std::mem::take(&mut self.region_to_transferred_operands);
        for (region, operands) in transferred {
            if let Some(canonical) = renamed.get(&region) {
                self.region_to_transferred_operands
                    .insert(*canonical, operands);
            }
        }

        if let Some(largest) = self.element_to_region.keys().next_back() {
            self.fresh_label = self.fresh_label.max(label_above(*largest));
        }

        debug_assert!(self.is_canonical_correct());
    }

    /// Makes the next `canonicalize` run its full pass again.
    #[cfg(test)]
    pub(crate) fn forget_canonical_form(&mut self) {
        self.canonical = false;
    }

    /// Same regions and the same transferred operands, ignoring region numbering and history.
    pub fn equals(fst: &mut Partition, snd: &mut Partition) -> bool {
        fst.canonicalize();
        snd.canonicalize();

        fst.element_to_region == snd.element_to_region
            && fst.region_to_transferred_operands == snd.region_to_transferred_operands
    }

    /// The coarsest partition where two elements share a region whenever they share one in
    /// either input. Regions transferred on either side stay transferred.
    pub fn join(
        fst: &Partition,
        snd: &mut Partition,
        pred_block: BlockId,
        succ_block: BlockId,
    ) -> Result<Partition, CompilerError> {
        debug_assert!(
            fst.history.factory().same_arena(snd.history.factory()),
            "joined partitions must share one history factory"
        );

        let mut result = fst.clone();
        result.canonicalize();
        snd.canonicalize();
        result.fresh_label = result.fresh_label.max(snd.fresh_label);

        result.push_history_sequence_boundary(SequenceBoundarySemantics::CfgJoin, None);
        if let Some(snd_head) = snd.history.head() {
            result
                .history
                .push_cfg_history_join(snd_head, pred_block, succ_block);
        }

        for (&snd_element, &snd_region) in &snd.element_to_region {
            let representative = Element(snd_region.0);

            if snd_element == representative {
                if !result.is_tracking_element(snd_element) {
                    result.track_new_element(snd_element, true)?;
                }
                continue;
            }

            // The representative is the smallest element of its region, so it was visited already
            let Some(representative_region) = result.region(representative) else {
                continue;
            };

            match result.region(snd_element) {
                Some(region) => {
                    result.merge_regions(
                        representative,
                        representative_region,
                        snd_element,
                        region,
                        true,
                    );
                }
                None => result.assign_element_to_region(
                    snd_element,
                    representative,
                    representative_region,
                    true,
                )?,
            }
        }

        for (snd_region, operands) in &snd.region_to_transferred_operands {
            if let Some(region) = result.region(Element(snd_region.0)) {
                result.add_transferred_operands(region, operands);
            }
        }

        result.canonicalize();
        Ok(result)
    }

    /// Checks that every transferred region still has elements
    /// and that the fresh label is above every region in use.
    pub fn validate_region_to_transferred_op_map_regions(&self) -> Result<(), CompilerError> {
        for region in self.region_to_transferred_operands.keys() {
            if !self.element_to_region.values().any(|used| used == region) {
                return_compiler_error!(
                    format!("Transferred region {region} has no elements in partition {self}"),
                    ErrorLocation::default(),
                    {
                        CompilationStage => "Region Isolation",
                    }
                );
            }
        }

        if let Some(region) = self
            .element_to_region
            .values()
            .find(|region| **region >= self.fresh_label)
        {
            return_compiler_error!(
                format!(
                    "Region {region} is not below the fresh label {}",
                    self.fresh_label
                ),
                ErrorLocation::default(),
                {
                    CompilationStage => "Region Isolation",
                }
            );
        }

        Ok(())
    }

    /// When the partition claims to be canonical, every region must be named after its
    /// smallest element.
    pub fn is_canonical_correct(&self) -> bool {
        if !self.canonical {
            return true;
        }

        self.element_to_region.iter().all(|(element, region)| {
            let representative = Element(region.0);
            representative <= *element
                && self.element_to_region.get(&representative) == Some(region)
        }) && self
            .element_to_region
            .values()
            .all(|region| *region < self.fresh_label)
    }

    pub fn to_snapshot(&self) -> PartitionSnapshot {
        let mut canonical = self.clone();
        canonical.canonicalize();

        let transferred = canonical
            .region_to_transferred_operands
            .iter()
            .map(|(region, operands)| TransferredRegionSnapshot {
                elements: canonical.elements_in_region(*region),
                operands: operands.as_slice().to_vec(),
            })
            .collect();

        PartitionSnapshot {
            regions: canonical.regions(),
            transferred,
        }
    }

    /// Detaches a tracked element from its current region, recording which kind of removal it was.
    /// An emptied region forgets its transfer state.
    fn detach_element(&mut self, element: Element, update_history: bool) {
        let Some(old_region) = self.region(element) else {
            return;
        };

        let witness = self
            .element_to_region
            .iter()
            .find(|(other, region)| **other != element && **region == old_region)
            .map(|(other, _)| *other);

        match witness {
            Some(witness) => {
                if update_history {
                    self.history
                        .push_remove_element_from_region(witness, element);
                }
            }
            None => {
                if update_history {
                    self.history.push_remove_last_element_from_region(element);
                }
                self.region_to_transferred_operands.remove(&old_region);
            }
        }

        self.element_to_region.remove(&element);
    }

    fn assign_element_to_region(
        &mut self,
        old_element: Element,
        new_element: Element,
        new_region: Region,
        update_history: bool,
    ) -> Result<(), CompilerError> {
        if self.region(old_element) == Some(new_region) {
            return Ok(());
        }

        self.track_new_element(old_element, update_history)?;
        self.element_to_region.insert(old_element, new_region);
        if update_history {
            self.history
                .push_assign_element_regions(new_element, old_element);
        }

        self.canonical = false;
        Ok(())
    }

    // Unions into whatever the region was already transferred by
    fn add_transferred_operands(&mut self, region: Region, operands: &TransferringOperandSet) {
        match self.region_to_transferred_operands.get_mut(&region) {
            Some(existing) => *existing = existing.merge(operands),
            None => {
                self.region_to_transferred_operands
                    .insert(region, operands.clone());
            }
        }
    }

    fn merge_regions(
        &mut self,
        fst: Element,
        fst_region: Region,
        snd: Element,
        snd_region: Region,
        update_history: bool,
    ) -> Region {
        if fst_region == snd_region {
            return fst_region;
        }

        let (into, winner, loser) = if fst_region < snd_region {
            (fst, fst_region, snd_region)
        } else {
            (snd, snd_region, fst_region)
        };

        let moved = self.horizontal_update(loser, winner);
        if update_history {
            self.history.push_merge_element_regions(into, &moved);
        }

        if let Some(loser_operands) = self.region_to_transferred_operands.remove(&loser) {
            self.add_transferred_operands(winner, &loser_operands);
        }

        self.canonical = false;
        winner
    }

    // Rewrites every element of `from` into `to` and returns the moved elements
    fn horizontal_update(&mut self, from: Region, to: Region) -> Vec<Element> {
        let mut moved = Vec::new();
        for (element, region) in self.element_to_region.iter_mut() {
            if *region == from {
                *region = to;
                moved.push(*element);
            }
        }
        moved
    }
}

impl Display for Partition {
    /// Regions in parentheses, transferred regions in braces.
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut by_region: BTreeMap<Region, Vec<Element>> = BTreeMap::new();
        for (element, region) in self.iter() {
            by_region.entry(region).or_default().push(element);
        }

        write!(f, "[")?;
        for (region, elements) in &by_region {
            let (open, close) = if self.region_to_transferred_operands.contains_key(region) {
                ("{", "}")
            } else {
                ("(", ")")
            };

            write!(f, "{open}")?;
            for (index, element) in elements.iter().enumerate() {
                if index > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", element.0)?;
            }
            write!(f, "{close}")?;
        }
        write!(f, "]")
    }
}

fn sorted_unique(elements: &[Element]) -> Vec<Element> {
    let mut elements = elements.to_vec();
    elements.sort();
    elements.dedup();
    elements
}

fn check_trackable(elements: &[Element]) -> Result<(), CompilerError> {
    if let Some(element) = elements.iter().find(|element| **element > Element::MAX) {
        return_compiler_error!(
            format!("{element} is above the largest trackable element {}", Element::MAX),
            ErrorLocation::default(),
            {
                CompilationStage => "Region Isolation",
                Element => element.to_string(),
            }
        );
    }

    Ok(())
}

// Tracked elements never exceed `Element::MAX`, so the fallback is unreachable
fn label_above(element: Element) -> Region {
    Region::from(element).next().unwrap_or(Region(u32::MAX))
}
