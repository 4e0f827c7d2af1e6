//! Immutable domain model for parsed Wayland protocol documents.
//!
//! Every value here is constructed once by the parser and never mutated
//! afterwards. All derived names (class names, escaped identifiers,
//! normalized enum values) are computed on demand from the stored schema
//! names so that the same input always produces the same output.

/// Root unit of compilation; one protocol per input XML document.
#[derive(Debug)]
pub struct Protocol {
    pub name: String,
    pub copyright: Option<Copyright>,
    pub description: Option<Description>,
    pub interfaces: Vec<Interface>,
}

impl Protocol {
    /// Directory/module name for the generated output. Protocol names may
    /// contain `-` (e.g. `xdg-shell`), which is not a valid module name.
    pub fn module_name(&self) -> String {
        self.name.replace('-', "_")
    }
}

#[derive(Debug)]
pub struct Copyright {
    pub body: String,
}

#[derive(Debug)]
pub struct Description {
    pub summary: Option<String>,
    pub body: String,
}

/// A named, versioned collection of requests, events, and enums.
#[derive(Debug)]
pub struct Interface {
    pub name: String,
    pub version: u32,
    pub description: Option<Description>,
    pub enums: Vec<Enum>,
    pub requests: Vec<Request>,
    pub events: Vec<Event>,
}

impl Interface {
    /// CamelCase form of the wire name with underscores removed. This is
    /// the only name transform used for generated type identifiers; two
    /// wire names that camel-case identically are not reconciled.
    pub fn class_name(&self) -> String {
        to_camelcase(&self.name)
    }

    /// Requests and events in declaration order, requests first.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.requests
            .iter()
            .map(|r| &r.message)
            .chain(self.events.iter().map(|e| &e.message))
    }
}

/// Client -> server call. `destructor` requests imply the local proxy
/// handle dies with the message.
#[derive(Debug)]
pub struct Request {
    pub destructor: bool,
    pub message: Message,
}

/// Server -> client notification.
#[derive(Debug)]
pub struct Event {
    pub message: Message,
}

/// Common shape of requests and events.
#[derive(Debug)]
pub struct Message {
    pub name: String,
    /// 0-based position within its own kind's list; requests and events
    /// are numbered independently. There is no opcode attribute in the
    /// schema, document order is authoritative.
    pub opcode: u16,
    pub since: Option<u32>,
    pub description: Option<Description>,
    pub args: Vec<Argument>,
}

impl Message {
    /// Method identifier in generated code. `global` and `import` are
    /// escaped with a trailing underscore; remaining keyword collisions
    /// are handled with raw identifiers at emission.
    pub fn fn_name(&self) -> String {
        match self.name.as_str() {
            "global" | "import" => format!("{}_", self.name),
            _ => self.name.clone(),
        }
    }
}

/// The fixed 8-way Wayland argument type system.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgType {
    Int,
    Uint,
    Fixed,
    String,
    Object,
    NewId,
    Array,
    Fd,
}

#[derive(Debug)]
pub struct Argument {
    pub name: String,
    pub ty: ArgType,
    pub summary: Option<String>,
    /// Bound interface for `object`/`new_id` arguments.
    pub interface: Option<String>,
    pub allow_null: bool,
    /// Schema-level enum reference; carried through but has no effect on
    /// signatures.
    pub enum_: Option<String>,
}

impl Argument {
    /// Class name of the bound interface, if any.
    pub fn interface_class(&self) -> Option<String> {
        self.interface.as_deref().map(to_camelcase)
    }
}

#[derive(Debug)]
pub struct Enum {
    pub name: String,
    pub since: Option<u32>,
    pub bitfield: bool,
    pub description: Option<Description>,
    pub entries: Vec<Entry>,
}

impl Enum {
    /// An enum literally named `version` collides with the interface's
    /// `version` attribute in generated code and is renamed `version_`.
    pub fn ident_name(&self) -> String {
        if self.name == "version" {
            "version_".to_string()
        } else {
            self.name.clone()
        }
    }

    /// Generated type name; the `version_` rename keeps its trailing
    /// underscore so class-casing does not undo it.
    pub fn class_name(&self) -> String {
        let ident = self.ident_name();
        let mut class = to_camelcase(&ident);
        if ident.ends_with('_') {
            class.push('_');
        }
        class
    }
}

#[derive(Debug)]
pub struct Entry {
    pub name: String,
    /// Literal value text from the schema, decimal or `0x`-prefixed hex.
    pub value: String,
    /// Numeric value, validated at parse time.
    pub value_u32: u32,
    pub summary: Option<String>,
    pub since: Option<u32>,
}

impl Entry {
    /// Value as re-emitted: hex uppercased (`0xAB`, not `0xab`), decimal
    /// passed through untouched.
    pub fn normalized_value(&self) -> String {
        match self.value.strip_prefix("0x") {
            Some(hex) => format!("0x{}", hex.to_uppercase()),
            None => self.value.clone(),
        }
    }

    /// Entry identifier within its enum: pure-integer names are prefixed
    /// with the enum name, reserved identifiers get a trailing underscore.
    pub fn ident_name(&self, enum_name: &str) -> String {
        if !self.name.is_empty() && self.name.bytes().all(|b| b.is_ascii_digit()) {
            format!("{}_{}", enum_name, self.name)
        } else if matches!(self.name.as_str(), "name" | "async") {
            format!("{}_", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// `wl_compositor` -> `WlCompositor`. Underscores are removed and each
/// segment's first character is uppercased; the rest is kept as written.
pub fn to_camelcase(s: &str) -> String {
    let mut r = String::with_capacity(s.len());
    let mut init = true;
    for c in s.chars() {
        if c == '_' {
            init = true;
            continue;
        }
        if init {
            r.extend(c.to_uppercase());
            init = false;
            continue;
        }
        r.push(c);
    }
    r
}
