//! Batch compiler from Wayland protocol XML to generated binding modules.
//!
//! The pipeline is strictly phased: parse every input document into the
//! immutable domain model, build the [`Universe`] (the global
//! interface-to-protocol map) over the complete set, then emit each
//! protocol's module directory. Emission never starts before the whole
//! universe exists, because any protocol may reference interfaces that
//! another input defines.

pub mod element;
pub mod emit;
pub mod parse;
pub mod protocol;
pub mod resolve;
pub mod signature;

pub use emit::{emit_interface, emit_manifest, emit_protocol, write_protocol, EmitError};
pub use parse::{parse, ParseError};
pub use protocol::{Interface, Protocol};
pub use resolve::{Import, ResolveError, Universe};
pub use signature::{type_array, Signature};

use std::path::Path;

/// Build the universe over `protocols` and write every protocol's module
/// directory under `out_dir`.
pub fn generate(protocols: Vec<Protocol>, out_dir: &Path) -> Result<(), EmitError> {
    let universe = Universe::new(protocols);
    for protocol in universe.protocols() {
        emit::write_protocol(&universe, protocol, out_dir)?;
    }
    Ok(())
}
