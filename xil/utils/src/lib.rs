//! Shared utilities for the XIL back-end.
mod errors;
mod id;
mod namegenerator;
mod out_file;

pub mod idx;
pub mod math;

pub use errors::{Error, ErrorKind, Loc, MultiError, XilResult};
pub use id::{GSym, GetName, Id};
pub use idx::{IndexRef, IndexedMap};
pub use math::{bits_needed_for, ceil_log2};
pub use namegenerator::NameGenerator;
pub use out_file::OutputFile;
