//! Conversion of cryostat transport measurements (TDMS, CSV, DAT) into HDF5.
//!
//! A [`Registry`] owns every [`Channel`] read from one source file. Ingest
//! drivers fill it, the derivation methods add computed channels, and the
//! [`export`] module writes it out.
pub mod channel;
pub mod config;
pub mod derive;
pub mod drivers;
pub mod error;
pub mod export;
pub mod names;
pub mod registry;
pub mod timeaxis;
pub use channel::{AttrValue, Channel};
pub use config::{ConverterConfig, StepUnit};
pub use drivers::SourceFormat;
pub use error::{ConvertError, Result};
pub use export::Layout;
pub use registry::Registry;
