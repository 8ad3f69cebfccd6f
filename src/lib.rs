#![doc = include_str!("../README.md")]

mod error;

pub mod bits;
pub mod calibrate;
pub mod definition;
pub mod item;
pub mod raw;
pub mod resolve;
pub mod stream;
pub mod value;

pub use error::{Error, Result, Warnings};

pub use bits::BitBuffer;
pub use calibrate::{Calibrator, ContextCalibrator, EnumTable, PolyTerm, SplinePoint};
pub use definition::{
    ContainerDef, ContainerIdx, ContainerKind, DefinitionTree, EntryDef, EntryRef, ParamIdx,
    ParameterDef, Repeat, TypeDef, TypeIdx,
};
pub use item::{Decoded, ItemCodec};
pub use raw::RawEncoding;
pub use resolve::{resolve, ContentEntry, ContentModel, DataSource, EntryKind, RepeatTag};
pub use stream::StreamDispatcher;
pub use value::{all_hold, CompareOp, Comparison, NoLookup, ValidRange, Value, ValueLookup};
