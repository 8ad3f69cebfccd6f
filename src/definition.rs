//! In-memory definition tree: types, parameters/arguments, and
//! container/telecommand definitions.
//!
//! The tree is an arena with stable indices; containers reference their
//! base by index rather than by live reference, so ancestor walks are
//! cheap and ownership stays acyclic. The tree is read-only during
//! resolve/encode/decode calls.
//!
//! Parsing a mission database document into this tree is a collaborator's
//! concern; a `serde` JSON snapshot loader is provided in the same spirit
//! as a built-in definition database.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::calibrate::{Calibrator, ContextCalibrator};
use crate::raw::RawEncoding;
use crate::value::{Comparison, ValidRange, Value};
use crate::{Error, Result};

pub type TypeIdx = usize;
pub type ParamIdx = usize;
pub type ContainerIdx = usize;

/// A type definition: raw-encoding descriptor plus calibration and range
/// metadata shared by every item of this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct TypeDef {
    #[builder(setter(into))]
    pub name: String,
    /// Raw-encoding descriptor. A type without one carries no structural
    /// information and cannot back an item codec.
    #[builder(default, setter(strip_option))]
    pub encoding: Option<RawEncoding>,
    /// Default calibrator, the fallback after context calibrators.
    #[builder(default, setter(strip_option))]
    pub calibrator: Option<Calibrator>,
    /// Context-specific calibrators, tried in order before the default.
    #[builder(default)]
    pub context_calibrators: Vec<ContextCalibrator>,
    #[builder(default, setter(strip_option))]
    pub valid_range: Option<ValidRange>,
    #[builder(default, setter(strip_option))]
    pub units: Option<String>,
}

/// A telemetry parameter or telecommand argument definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct ParameterDef {
    #[builder(setter(into))]
    pub name: String,
    pub type_idx: TypeIdx,
    /// Initial/default value used when encoding without an assignment.
    #[builder(default, setter(strip_option))]
    pub initial: Option<Value>,
}

/// What a container entry refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryRef {
    Parameter(ParamIdx),
    Argument(ParamIdx),
    /// A literal constant written on encode regardless of caller values.
    Constant {
        name: String,
        type_idx: TypeIdx,
        value: Value,
    },
    /// Inclusion of another container's resolved entries in place.
    Container(ContainerIdx),
}

/// Repeat specification for an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Repeat {
    /// Fixed literal instance count.
    Count(u64),
    /// Count comes from the named parameter's just-decoded uncalibrated
    /// value.
    Parameter(String),
}

/// One entry in a container's own entry list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct EntryDef {
    pub what: EntryRef,
    /// Inclusion condition; the entry is materialized only when it holds
    /// against the already-resolved entries.
    #[builder(default, setter(strip_option))]
    pub condition: Option<Vec<Comparison>>,
    #[builder(default, setter(strip_option))]
    pub repeat: Option<Repeat>,
    /// Declared fixed gap skipped before this entry, in bits.
    #[builder(default)]
    pub gap_bits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Telemetry,
    Telecommand,
}

/// A container or telecommand definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct ContainerDef {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default = ContainerKind::Telemetry)]
    pub kind: ContainerKind,
    /// Base container this definition inherits entries from.
    #[builder(default, setter(strip_option))]
    pub base: Option<ContainerIdx>,
    /// Abstract containers never match a stream dispatch directly.
    #[builder(default)]
    pub is_abstract: bool,
    /// Equality constraints on inherited entries that must hold for this
    /// definition to be the correct interpretation of given data.
    #[builder(default)]
    pub restrictions: Vec<Comparison>,
    #[builder(default)]
    pub entries: Vec<EntryDef>,
}

/// The whole definition tree. Arena-indexed and immutable while any
/// decode/encode is in flight.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DefinitionTree {
    pub types: Vec<TypeDef>,
    pub parameters: Vec<ParameterDef>,
    pub containers: Vec<ContainerDef>,
}

impl DefinitionTree {
    pub fn add_type(&mut self, def: TypeDef) -> TypeIdx {
        self.types.push(def);
        self.types.len() - 1
    }

    pub fn add_parameter(&mut self, def: ParameterDef) -> ParamIdx {
        self.parameters.push(def);
        self.parameters.len() - 1
    }

    pub fn add_container(&mut self, def: ContainerDef) -> ContainerIdx {
        self.containers.push(def);
        self.containers.len() - 1
    }

    /// # Errors
    /// [`Error::NotFound`] when no type has this name.
    pub fn lookup_type(&self, name: &str) -> Result<TypeIdx> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| Error::NotFound {
                kind: "type",
                name: name.to_string(),
            })
    }

    /// # Errors
    /// [`Error::NotFound`] when no parameter or argument has this name.
    pub fn lookup_parameter(&self, name: &str) -> Result<ParamIdx> {
        self.parameters
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::NotFound {
                kind: "parameter",
                name: name.to_string(),
            })
    }

    /// # Errors
    /// [`Error::NotFound`] when no container has this name.
    pub fn lookup_container(&self, name: &str) -> Result<ContainerIdx> {
        self.containers
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::NotFound {
                kind: "container",
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn type_def(&self, idx: TypeIdx) -> &TypeDef {
        &self.types[idx]
    }

    #[must_use]
    pub fn parameter(&self, idx: ParamIdx) -> &ParameterDef {
        &self.parameters[idx]
    }

    #[must_use]
    pub fn container(&self, idx: ContainerIdx) -> &ContainerDef {
        &self.containers[idx]
    }

    /// Type backing a parameter.
    #[must_use]
    pub fn parameter_type(&self, idx: ParamIdx) -> &TypeDef {
        &self.types[self.parameters[idx].type_idx]
    }

    /// Inheritance path for `container`, root first, leaf last.
    ///
    /// # Errors
    /// [`Error::Cycle`] if following base references revisits a container.
    pub fn inheritance_path(&self, container: ContainerIdx) -> Result<Vec<ContainerIdx>> {
        let mut path = vec![container];
        let mut cur = container;
        while let Some(base) = self.containers[cur].base {
            if path.contains(&base) {
                return Err(Error::Cycle(self.containers[base].name.clone()));
            }
            path.push(base);
            cur = base;
        }
        path.reverse();
        Ok(path)
    }

    /// True when `ancestor` appears on `container`'s inheritance path
    /// (a container is its own ancestor).
    #[must_use]
    pub fn inherits_from(&self, container: ContainerIdx, ancestor: ContainerIdx) -> bool {
        self.inheritance_path(container)
            .map(|path| path.contains(&ancestor))
            .unwrap_or(false)
    }

    /// Load a definition snapshot from a JSON file.
    ///
    /// # Errors
    /// Any I/O error opening the file, or a deserialization error for a
    /// malformed snapshot.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_json::from_reader(File::open(path)?)?)
    }

    /// # Errors
    /// A deserialization error for a malformed snapshot.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
