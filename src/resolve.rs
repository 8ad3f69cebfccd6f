//! Structural resolver: materializes a container or telecommand
//! definition against one specific input into a [`ContentModel`].
//!
//! Resolution is a single left-to-right pass with an explicit bit cursor
//! and a lazily-growing list of resolved entries. Conditions, repeat
//! counts, and context-calibrator guards are evaluated against the
//! in-progress decode, so an entry's position is a property of the data,
//! not the definition.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::bits::BitBuffer;
use crate::definition::{
    ContainerIdx, DefinitionTree, EntryDef, EntryRef, Repeat,
};
use crate::item::{Decoded, ItemCodec};
use crate::value::{all_hold, CompareOp, Comparison, Value, ValueLookup};
use crate::{Error, Result, Warnings};

/// What a resolve call materializes a definition against.
#[derive(Clone, Copy)]
pub enum DataSource<'a> {
    /// Decode: interpret the bits of a downlinked buffer.
    Bits(&'a BitBuffer),
    /// Encode: assignments from item name to calibrated value.
    Values(&'a HashMap<String, Value>),
    /// Describe structure only; entries carry positions but no values.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Parameter,
    Argument,
    Constant,
    /// Zero-width marker emitted where a nested container's entries were
    /// included.
    Container,
}

/// `instance/total` tag on each member of an expanded repeat group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatTag {
    /// 1-based instance number.
    pub instance: u32,
    pub total: u32,
}

impl std::fmt::Display for RepeatTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.instance, self.total)
    }
}

/// One resolved entry. Created once per processing call, read-only
/// thereafter.
#[derive(Debug, Clone)]
pub struct ContentEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Raw field width. An excluded entry still reports its declared
    /// width but contributes zero bits to the layout.
    pub size_bits: u32,
    /// Start bit, or `None` when the entry was conditionally excluded.
    pub position: Option<usize>,
    /// Value triple, or `None` when excluded or resolving structure only.
    pub value: Option<Decoded>,
    /// Initial/default value from the definition.
    pub initial: Option<Value>,
    /// Rendering of the inclusion condition that gated this entry.
    pub condition: Option<String>,
    pub repeat: Option<RepeatTag>,
}

impl ContentEntry {
    /// False when the entry was conditionally excluded and is therefore
    /// "not currently in use".
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.position.is_some()
    }
}

impl std::fmt::Display for ContentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.position, &self.value) {
            (Some(pos), Some(v)) => {
                write!(
                    f,
                    "{} @ {} ({} bits) = {}",
                    self.name, pos, self.size_bits, v.calibrated
                )?;
            }
            (Some(pos), None) => {
                write!(f, "{} @ {} ({} bits)", self.name, pos, self.size_bits)?;
            }
            _ => write!(f, "{} (not in use)", self.name)?,
        }
        if let Some(tag) = &self.repeat {
            write!(f, " [{tag}]")?;
        }
        Ok(())
    }
}

/// The materialized result of resolving one definition against one input.
///
/// A model always corresponds to exactly one (definition × input) pair and
/// is never mutated to represent a different input.
#[derive(Debug, Clone)]
pub struct ContentModel {
    container: ContainerIdx,
    entries: Vec<ContentEntry>,
    total_bits: usize,
    warnings: Warnings,
    matches: bool,
    valid: bool,
}

impl ContentModel {
    #[must_use]
    pub fn container(&self) -> ContainerIdx {
        self.container
    }

    /// Resolved entries in definition order with repeats expanded in
    /// place.
    #[must_use]
    pub fn entries(&self) -> &[ContentEntry] {
        &self.entries
    }

    /// Last resolved present entry with this name, if any.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&ContentEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.name == name && e.is_present())
    }

    #[must_use]
    pub fn total_size_bits(&self) -> usize {
        self.total_bits
    }

    /// True when resolution completed cleanly: restrictions held and every
    /// present entry obtained a value (always true for describe-only
    /// models).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True when every restriction comparison held against the resolved
    /// data. Used by stream dispatch to select the correct interpretation.
    #[must_use]
    pub fn matches_restrictions(&self) -> bool {
        self.matches
    }

    /// Append-only diagnostics collected during resolution. Empty means a
    /// fully clean result.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Assemble the output buffer: every present entry's raw bits written
    /// at its computed offset, declared gaps zero-filled.
    #[must_use]
    pub fn encode_to_bits(&self) -> BitBuffer {
        let mut out = BitBuffer::zeroed(self.total_bits);
        for entry in &self.entries {
            if let (Some(pos), Some(v)) = (&entry.position, &entry.value) {
                out.write_buffer(*pos, &v.bits);
            }
        }
        out
    }

    /// Restriction check of this model's container against another buffer,
    /// without surfacing warnings. Any fatal decode error counts as
    /// incompatible.
    #[must_use]
    pub fn is_compatible_with(&self, tree: &DefinitionTree, bits: &BitBuffer) -> bool {
        resolve_quiet(tree, self.container, bits)
            .map(|m| m.matches)
            .unwrap_or(false)
    }
}

impl std::fmt::Display for ContentModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ContentModel{{entries: {}, bits: {}, valid: {}, warnings: {}}}",
            self.entries.len(),
            self.total_bits,
            self.valid,
            self.warnings.len()
        )
    }
}

/// Resolve `container` against `source`.
///
/// Restriction failures leave the model flagged non-matching with a
/// warning per failed comparison; use [`ContentModel::is_compatible_with`]
/// or the stream dispatcher for warning-free matching.
///
/// # Errors
/// Structural problems are fatal: an inheritance cycle, a buffer shorter
/// than the layout requires, an unusable repeat-count parameter, or a type
/// with missing/unsupported encoding.
pub fn resolve(
    tree: &DefinitionTree,
    container: ContainerIdx,
    source: DataSource,
) -> Result<ContentModel> {
    Resolver::new(tree, source, false).run(container)
}

/// Matching-mode resolve: identical semantics but restriction failures are
/// not recorded as warnings.
pub(crate) fn resolve_quiet(
    tree: &DefinitionTree,
    container: ContainerIdx,
    bits: &BitBuffer,
) -> Result<ContentModel> {
    Resolver::new(tree, DataSource::Bits(bits), true).run(container)
}

/// Lookup over the lazily-growing entry list; later entries shadow
/// earlier ones of the same name.
struct EntryScan<'a>(&'a [ContentEntry]);

impl ValueLookup for EntryScan<'_> {
    fn lookup(&self, item: &str, calibrated: bool) -> Option<Value> {
        self.0
            .iter()
            .rev()
            .filter(|e| e.name == item)
            .find_map(|e| e.value.as_ref())
            .map(|v| {
                if calibrated {
                    v.calibrated.clone()
                } else {
                    v.uncalibrated.clone()
                }
            })
    }
}

struct Resolver<'a> {
    tree: &'a DefinitionTree,
    source: DataSource<'a>,
    quiet: bool,
    entries: Vec<ContentEntry>,
    warnings: Warnings,
    cursor: usize,
    include_stack: Vec<ContainerIdx>,
    /// Values fixed by equality restrictions, used as encode defaults.
    restricted: HashMap<String, Value>,
}

impl<'a> Resolver<'a> {
    fn new(tree: &'a DefinitionTree, source: DataSource<'a>, quiet: bool) -> Self {
        Resolver {
            tree,
            source,
            quiet,
            entries: Vec::new(),
            warnings: Warnings::new(),
            cursor: 0,
            include_stack: Vec::new(),
            restricted: HashMap::new(),
        }
    }

    fn run(mut self, container: ContainerIdx) -> Result<ContentModel> {
        let path = self.tree.inheritance_path(container)?;
        debug!(
            container = %self.tree.container(container).name,
            depth = path.len(),
            "resolving container"
        );

        let restrictions: Vec<Comparison> = path
            .iter()
            .flat_map(|&c| self.tree.container(c).restrictions.iter().cloned())
            .collect();
        if matches!(self.source, DataSource::Values(_)) {
            for cmp in &restrictions {
                if cmp.op == CompareOp::Eq {
                    self.restricted.insert(cmp.item.clone(), cmp.value.clone());
                }
            }
        }

        self.include_stack.push(container);
        for &ancestor in &path {
            // borrow the entry list out of the walk
            let entries = self.tree.container(ancestor).entries.clone();
            self.process_entries(&entries)?;
        }
        self.include_stack.pop();

        let matches = match self.source {
            DataSource::None => true,
            _ => self.check_restrictions(&restrictions),
        };
        let valid = matches
            && self.entries.iter().all(|e| {
                !e.is_present()
                    || e.value.is_some()
                    || matches!(self.source, DataSource::None)
                    || e.kind == EntryKind::Container
            });

        debug!(
            total_bits = self.cursor,
            entries = self.entries.len(),
            matches,
            "resolved container"
        );
        Ok(ContentModel {
            container,
            entries: self.entries,
            total_bits: self.cursor,
            warnings: self.warnings,
            matches,
            valid,
        })
    }

    fn check_restrictions(&mut self, restrictions: &[Comparison]) -> bool {
        let mut matches = true;
        for cmp in restrictions {
            let holds = cmp.evaluate(&EntryScan(&self.entries)).unwrap_or(false);
            if !holds {
                matches = false;
                if !self.quiet {
                    self.warnings.push(format!("restriction {cmp} not satisfied"));
                }
            }
        }
        matches
    }

    fn process_entries(&mut self, entries: &[EntryDef]) -> Result<()> {
        for entry in entries {
            if let Some(condition) = &entry.condition {
                if !all_hold(condition, &EntryScan(&self.entries)) {
                    self.push_excluded(entry, condition)?;
                    continue;
                }
            }

            let count = match &entry.repeat {
                None => None,
                Some(Repeat::Count(n)) => Some(*n),
                Some(Repeat::Parameter(name)) => {
                    let count = EntryScan(&self.entries)
                        .lookup(name, false)
                        .and_then(|v| v.as_i64())
                        .and_then(|v| u64::try_from(v).ok());
                    match count {
                        Some(n) => Some(n),
                        // without data a dynamic count is unresolvable;
                        // describe one representative instance
                        None if matches!(self.source, DataSource::None) => Some(1),
                        None => return Err(Error::RepeatCount(name.clone())),
                    }
                }
            };

            match count {
                None => self.materialize(entry, None)?,
                Some(total) => {
                    for instance in 1..=total {
                        self.materialize(
                            entry,
                            Some(RepeatTag {
                                instance: instance as u32,
                                total: total as u32,
                            }),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Emit a "not currently in use" marker for a conditionally excluded
    /// entry, so callers can still inspect why it is absent.
    fn push_excluded(&mut self, entry: &EntryDef, condition: &[Comparison]) -> Result<()> {
        let (name, kind, size_bits) = match &entry.what {
            EntryRef::Parameter(idx) => (
                self.tree.parameter(*idx).name.clone(),
                EntryKind::Parameter,
                self.declared_width(self.tree.parameter(*idx).type_idx),
            ),
            EntryRef::Argument(idx) => (
                self.tree.parameter(*idx).name.clone(),
                EntryKind::Argument,
                self.declared_width(self.tree.parameter(*idx).type_idx),
            ),
            EntryRef::Constant { name, type_idx, .. } => (
                name.clone(),
                EntryKind::Constant,
                self.declared_width(*type_idx),
            ),
            EntryRef::Container(idx) => {
                (self.tree.container(*idx).name.clone(), EntryKind::Container, 0)
            }
        };
        trace!(entry = %name, "entry excluded by condition");
        self.entries.push(ContentEntry {
            name,
            kind,
            size_bits,
            position: None,
            value: None,
            initial: None,
            condition: Some(render_condition(condition)),
            repeat: None,
        });
        Ok(())
    }

    fn declared_width(&self, type_idx: usize) -> u32 {
        self.tree
            .type_def(type_idx)
            .encoding
            .map(|e| e.bit_width())
            .unwrap_or(0)
    }

    fn materialize(&mut self, entry: &EntryDef, tag: Option<RepeatTag>) -> Result<()> {
        self.cursor += entry.gap_bits as usize;
        let condition = entry.condition.as_deref().map(render_condition);

        match &entry.what {
            EntryRef::Parameter(idx) | EntryRef::Argument(idx) => {
                let kind = if matches!(entry.what, EntryRef::Argument(_)) {
                    EntryKind::Argument
                } else {
                    EntryKind::Parameter
                };
                let tree = self.tree;
                let param = tree.parameter(*idx);
                let codec = ItemCodec::new(&param.name, tree.parameter_type(*idx))?;
                let initial = param.initial.clone();
                let assigned = self.value_for(&param.name, initial.as_ref());
                self.push_item(codec, kind, initial, condition, tag, assigned)?;
            }
            EntryRef::Constant {
                name,
                type_idx,
                value,
            } => {
                let tree = self.tree;
                let codec = ItemCodec::new(name, tree.type_def(*type_idx))?;
                let assigned = match self.source {
                    // constants ignore caller assignments
                    DataSource::Values(_) => Some(value.clone()),
                    _ => None,
                };
                self.push_item(
                    codec,
                    EntryKind::Constant,
                    Some(value.clone()),
                    condition,
                    tag,
                    assigned,
                )?;
            }
            EntryRef::Container(idx) => {
                let name = self.tree.container(*idx).name.clone();
                if self.include_stack.contains(idx) {
                    return Err(Error::Cycle(name));
                }
                trace!(container = %name, offset = self.cursor, "including container");
                self.entries.push(ContentEntry {
                    name,
                    kind: EntryKind::Container,
                    size_bits: 0,
                    position: Some(self.cursor),
                    value: None,
                    initial: None,
                    condition,
                    repeat: tag,
                });
                self.include_stack.push(*idx);
                let path = self.tree.inheritance_path(*idx)?;
                for &ancestor in &path {
                    let entries = self.tree.container(ancestor).entries.clone();
                    self.process_entries(&entries)?;
                }
                self.include_stack.pop();
            }
        }
        Ok(())
    }

    /// Value assigned to an item when encoding: the caller's assignment,
    /// else a value fixed by an equality restriction, else the declared
    /// initial value.
    fn value_for(&self, name: &str, initial: Option<&Value>) -> Option<Value> {
        match self.source {
            DataSource::Values(map) => map
                .get(name)
                .or_else(|| self.restricted.get(name))
                .cloned()
                .or_else(|| initial.cloned()),
            _ => None,
        }
    }

    fn push_item(
        &mut self,
        codec: ItemCodec,
        kind: EntryKind,
        initial: Option<Value>,
        condition: Option<String>,
        tag: Option<RepeatTag>,
        assigned: Option<Value>,
    ) -> Result<()> {
        let width = codec.bit_width();
        let position = self.cursor;

        let value = match self.source {
            DataSource::Bits(buf) => {
                let decoded =
                    codec.decode(buf, position, &EntryScan(&self.entries), &mut self.warnings)?;
                if kind == EntryKind::Constant {
                    if let Some(expected) = &initial {
                        if !decoded.uncalibrated.matches(expected)
                            && !decoded.calibrated.matches(expected)
                        {
                            self.warnings.push(format!(
                                "{} does not match constant value {expected}",
                                codec.name()
                            ));
                        }
                    }
                }
                Some(decoded)
            }
            DataSource::Values(_) => match assigned {
                Some(v) => Some(codec.encode(
                    &v,
                    true,
                    &EntryScan(&self.entries),
                    &mut self.warnings,
                )),
                None => {
                    self.warnings
                        .push(format!("{} no value provided", codec.name()));
                    None
                }
            },
            DataSource::None => None,
        };

        trace!(
            entry = codec.name(),
            offset = position,
            width,
            "resolved entry"
        );
        self.entries.push(ContentEntry {
            name: codec.name().to_string(),
            kind,
            size_bits: width,
            position: Some(position),
            value,
            initial,
            condition,
            repeat: tag,
        });
        self.cursor = position + width as usize;
        Ok(())
    }
}

fn render_condition(condition: &[Comparison]) -> String {
    condition
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" and ")
}
