//! Whole-program import resolution.
//!
//! Cross-interface references can point at interfaces defined in other
//! protocol documents, so every input must be parsed before any interface
//! is emitted. `Universe` is that completed parse set plus the derived
//! interface-name -> owning-protocol map; it is built once and read-only
//! afterwards.

use crate::protocol::{to_camelcase, Interface, Protocol};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "message `{interface}.{message}` references interface `{referenced}`, \
         which no loaded protocol defines"
    )]
    UnresolvedInterface {
        interface: String,
        message: String,
        referenced: String,
    },
}

/// A single `use` line in a generated interface module.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Import {
    /// Module path relative to the referencing interface's module:
    /// `super::<iface>` for a sibling in the same protocol,
    /// `super::super::<protocol>::<iface>` across protocols.
    pub path: String,
    pub class: String,
}

/// All parsed protocols and the global interface ownership map.
pub struct Universe {
    protocols: Vec<Protocol>,
    owners: BTreeMap<String, String>,
}

impl Universe {
    pub fn new(protocols: Vec<Protocol>) -> Universe {
        let mut owners = BTreeMap::new();
        let mut classes: BTreeMap<String, String> = BTreeMap::new();
        for protocol in &protocols {
            for iface in &protocol.interfaces {
                owners.insert(iface.name.clone(), protocol.name.clone());
                let class = iface.class_name();
                if let Some(prev) = classes.insert(class.clone(), iface.name.clone()) {
                    if prev != iface.name {
                        // Latent schema ambiguity; surfaced but not reconciled.
                        log::warn!(
                            "interfaces `{prev}` and `{}` both derive class name `{class}`",
                            iface.name
                        );
                    }
                }
            }
        }
        Universe { protocols, owners }
    }

    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    /// Name of the protocol defining `interface`, if any protocol does.
    pub fn owner(&self, interface: &str) -> Option<&str> {
        self.owners.get(interface).map(String::as_str)
    }

    /// Deduplicated, deterministically ordered imports for one interface.
    /// Self-references are implicit and never imported; a reference to an
    /// interface outside the universe is a hard error.
    pub fn imports_for(
        &self,
        protocol: &Protocol,
        iface: &Interface,
    ) -> Result<BTreeSet<Import>, ResolveError> {
        let mut imports = BTreeSet::new();
        for message in iface.messages() {
            for arg in &message.args {
                let Some(referenced) = arg.interface.as_deref() else {
                    continue;
                };
                if referenced == iface.name {
                    continue;
                }
                let owner =
                    self.owner(referenced)
                        .ok_or_else(|| ResolveError::UnresolvedInterface {
                            interface: iface.name.clone(),
                            message: message.name.clone(),
                            referenced: referenced.to_string(),
                        })?;
                let path = if owner == protocol.name {
                    format!("super::{referenced}")
                } else {
                    format!("super::super::{}::{referenced}", owner.replace('-', "_"))
                };
                imports.insert(Import {
                    path,
                    class: to_camelcase(referenced),
                });
            }
        }
        Ok(imports)
    }
}
