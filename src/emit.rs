//! Code emitter.
//!
//! For each interface this renders four declarative units — the interface
//! with its opcode tables and enums, the client proxy, the server
//! resource, and the global binding factory — as a token stream, then
//! formats it with prettyplease. All type reasoning happens before this
//! module: signatures, opcodes, and imports arrive pre-resolved.

use crate::protocol::{
    to_camelcase, ArgType, Argument, Description, Entry, Enum, Interface, Message, Protocol,
};
use crate::resolve::{ResolveError, Universe};
use crate::signature::{type_array, Signature};
use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::quote;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("request `{interface}.{request}` declares more than one new_id argument")]
    MultipleNewIds { interface: String, request: String },
    #[error("generated module for interface `{interface}` does not parse")]
    Format {
        interface: String,
        #[source]
        source: syn::Error,
    },
    #[error("could not write `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

const GENERATED_MARKER: &str = "Generated by wl-protogen; do not edit.";

/// Which generated wrapper an object-typed parameter belongs to.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Side {
    Proxy,
    Resource,
}

fn tok_id(s: &str) -> Ident {
    Ident::new(s, Span::call_site())
}

/// Identifier that may collide with a Rust keyword; emitted raw if so.
fn escaped_id(s: &str) -> Ident {
    match s {
        "fn" | "static" | "union" | "struct" | "move" | "mut" | "ref" | "const" | "box"
        | "async" | "await" | "impl" | "trait" | "dyn" | "for" | "in" | "let" | "type"
        | "loop" | "match" | "use" | "mod" | "where" | "enum" | "as" | "break" | "continue"
        | "else" | "if" | "pub" | "return" | "unsafe" | "while" => {
            Ident::new_raw(s, Span::call_site())
        }
        _ => tok_id(s),
    }
}

/// Class-case an identifier, keeping a trailing underscore produced by the
/// reserved-name escapes so the escape survives the transform.
fn class_id(raw: &str) -> Ident {
    let mut class = to_camelcase(raw);
    if raw.ends_with('_') {
        class.push('_');
    }
    tok_id(&class)
}

fn doc_attr(description: &Option<Description>) -> TokenStream {
    let Some(desc) = description else {
        return TokenStream::new();
    };
    let text = match (&desc.summary, desc.body.is_empty()) {
        (Some(summary), false) => format!("{summary}\n\n{}", desc.body),
        (Some(summary), true) => summary.clone(),
        (None, _) => desc.body.clone(),
    };
    if text.is_empty() {
        return TokenStream::new();
    }
    quote! { #[doc = #text] }
}

/// Entry values keep their textual form so hex stays hex (uppercased).
fn value_tokens(entry: &Entry) -> TokenStream {
    entry
        .normalized_value()
        .parse()
        .expect("entry value validated at parse time")
}

// The three derived booleans of the emitter, plus one for the fixed-point
// carrier type. Pure functions of the interface's message lists.

fn needs_argument(iface: &Interface) -> bool {
    iface.messages().any(|m| !m.args.is_empty())
}

fn needs_any_interface(iface: &Interface) -> bool {
    iface
        .requests
        .iter()
        .any(|r| r.message.args.iter().any(is_unbound_new_id))
}

fn needs_any_object(iface: &Interface) -> bool {
    let unconstrained_object = iface
        .messages()
        .any(|m| m.args.iter().any(|a| a.ty == ArgType::Object && a.interface.is_none()));
    let unbound_event_new_id = iface
        .events
        .iter()
        .any(|e| e.message.args.iter().any(is_unbound_new_id));
    unconstrained_object || unbound_event_new_id
}

fn uses_fixed(iface: &Interface) -> bool {
    iface
        .messages()
        .any(|m| m.args.iter().any(|a| a.ty == ArgType::Fixed))
}

fn is_unbound_new_id(arg: &Argument) -> bool {
    arg.ty == ArgType::NewId && arg.interface.is_none()
}

fn runtime_import(iface: &Interface) -> TokenStream {
    let mut items = vec!["Global", "Interface", "MessageDesc", "Proxy", "Resource"];
    if needs_argument(iface) {
        items.push("Argument");
    }
    if needs_any_interface(iface) {
        items.push("AnyInterface");
    }
    if needs_any_object(iface) {
        items.push("AnyObject");
    }
    if uses_fixed(iface) {
        items.push("Fixed");
    }
    items.sort_unstable();
    let items = items.into_iter().map(tok_id);
    quote! { use wl_core::{ #(#items),* }; }
}

fn import_tokens(path: &str, class: &str) -> TokenStream {
    let segments = path.split("::").map(tok_id);
    let class = tok_id(class);
    quote! { use #(#segments)::*::#class; }
}

fn message_desc(message: &Message) -> TokenStream {
    let name = &message.name;
    let signature = Signature::of(message).to_wire();
    let types = type_array(message).into_iter().map(|slot| match slot {
        Some(class) => quote! { Some(#class) },
        None => quote! { None },
    });
    quote! {
        MessageDesc {
            name: #name,
            signature: #signature,
            types: &[#(#types),*],
        }
    }
}

fn enum_tokens(enm: &Enum) -> TokenStream {
    let name = tok_id(&enm.class_name());
    let doc = doc_attr(&enm.description);
    if enm.bitfield {
        let consts = enm.entries.iter().map(|e| {
            let ident = tok_id(&e.ident_name(&enm.name).to_uppercase());
            let value = value_tokens(e);
            quote! { pub const #ident: u32 = #value; }
        });
        quote! {
            #doc
            #[repr(transparent)]
            #[derive(Clone, Copy, Debug, PartialEq, Eq)]
            pub struct #name(pub u32);
            impl #name { #(#consts)* }
            impl From<u32> for #name {
                fn from(n: u32) -> #name {
                    #name(n)
                }
            }
            impl From<#name> for u32 {
                fn from(e: #name) -> u32 {
                    e.0
                }
            }
        }
    } else {
        // The schema allows several entries with the same value; only the
        // first becomes a variant, the rest alias it as associated consts.
        let mut first_by_value: BTreeMap<u32, Ident> = BTreeMap::new();
        let mut variants = Vec::new();
        let mut from_cases = Vec::new();
        let mut aliases = Vec::new();
        for e in &enm.entries {
            let ident = class_id(&e.ident_name(&enm.name));
            let value = value_tokens(e);
            match first_by_value.get(&e.value_u32) {
                Some(first) => aliases.push(quote! {
                    #[allow(non_upper_case_globals)]
                    pub const #ident: #name = #name::#first;
                }),
                None => {
                    variants.push(quote! { #ident = #value, });
                    from_cases.push(quote! { #value => Ok(#name::#ident), });
                    first_by_value.insert(e.value_u32, ident);
                }
            }
        }
        let alias_impl = if aliases.is_empty() {
            TokenStream::new()
        } else {
            quote! { impl #name { #(#aliases)* } }
        };
        quote! {
            #doc
            #[repr(u32)]
            #[derive(Clone, Copy, Debug, PartialEq, Eq)]
            pub enum #name { #(#variants)* }
            #alias_impl
            impl TryFrom<u32> for #name {
                type Error = u32;
                fn try_from(n: u32) -> Result<#name, u32> {
                    match n {
                        #(#from_cases)*
                        _ => Err(n),
                    }
                }
            }
            impl From<#name> for u32 {
                fn from(e: #name) -> u32 {
                    e as u32
                }
            }
        }
    }
}

/// Parameter type at the call site; `new_id` never reaches this.
fn param_type(arg: &Argument, side: Side) -> TokenStream {
    let base = match arg.ty {
        ArgType::Int => quote! { i32 },
        ArgType::Uint => quote! { u32 },
        ArgType::Fixed => quote! { Fixed },
        ArgType::String => quote! { &str },
        ArgType::Array => quote! { &[u8] },
        ArgType::Fd => quote! { std::os::fd::RawFd },
        ArgType::Object | ArgType::NewId => match (arg.interface_class(), side) {
            (Some(class), Side::Proxy) => {
                let class = tok_id(&class);
                quote! { &Proxy<#class> }
            }
            (Some(class), Side::Resource) => {
                let class = tok_id(&class);
                quote! { &Resource<#class> }
            }
            (None, _) => quote! { &AnyObject },
        },
    };
    if arg.allow_null {
        quote! { Option<#base> }
    } else {
        base
    }
}

/// Marshalled `Argument` values for one declared argument. A bound
/// `new_id` request argument contributes nothing (the runtime synthesizes
/// the id from the signature); an unbound one fills its string and
/// version wire slots from the expanded call parameters on the proxy side
/// and from the passed object handle on the resource side.
fn wire_values(arg: &Argument, side: Side) -> Vec<TokenStream> {
    let name = escaped_id(&arg.name);
    match arg.ty {
        ArgType::Int => vec![quote! { Argument::Int(#name) }],
        ArgType::Uint => vec![quote! { Argument::Uint(#name) }],
        ArgType::Fixed => vec![quote! { Argument::Fixed(#name) }],
        ArgType::Fd => vec![quote! { Argument::Fd(#name) }],
        ArgType::Array => vec![quote! { Argument::Array(#name.to_vec()) }],
        ArgType::String => {
            if arg.allow_null {
                vec![quote! { Argument::Str(#name.map(str::to_string)) }]
            } else {
                vec![quote! { Argument::Str(Some(#name.to_string())) }]
            }
        }
        ArgType::Object => {
            if arg.allow_null {
                vec![quote! { Argument::Object(#name.map(|o| o.id())) }]
            } else {
                vec![quote! { Argument::Object(Some(#name.id())) }]
            }
        }
        ArgType::NewId => match (side, &arg.interface) {
            (Side::Proxy, Some(_)) => vec![],
            (Side::Proxy, None) => vec![
                quote! { Argument::Str(Some(interface.to_string())) },
                quote! { Argument::Uint(version) },
            ],
            (Side::Resource, Some(_)) => vec![quote! { Argument::NewId(#name.id()) }],
            (Side::Resource, None) => vec![
                quote! { Argument::Str(Some(#name.interface().to_string())) },
                quote! { Argument::Uint(#name.version()) },
                quote! { Argument::NewId(#name.id()) },
            ],
        },
    }
}

fn request_method(
    iface_name: &str,
    message: &Message,
    destructor: bool,
) -> Result<TokenStream, EmitError> {
    let fname = escaped_id(&message.fn_name());
    let opcode = Literal::u16_suffixed(message.opcode);
    let doc = doc_attr(&message.description);

    let mut params = Vec::new();
    let mut values = Vec::new();
    // At most one new_id per request: it is the constructed child object,
    // elided from the parameter list (bound) or expanded to
    // interface/version (unbound).
    let mut new_id: Option<&Argument> = None;
    for arg in &message.args {
        match arg.ty {
            ArgType::NewId => {
                if new_id.is_some() {
                    return Err(EmitError::MultipleNewIds {
                        interface: iface_name.to_string(),
                        request: message.name.clone(),
                    });
                }
                new_id = Some(arg);
                if arg.interface.is_none() {
                    params.push(quote! { interface: &str });
                    params.push(quote! { version: u32 });
                }
            }
            _ => {
                let name = escaped_id(&arg.name);
                let ty = param_type(arg, Side::Proxy);
                params.push(quote! { #name: #ty });
            }
        }
        values.extend(wire_values(arg, Side::Proxy));
    }

    Ok(match new_id {
        Some(arg) => {
            let target = match arg.interface_class() {
                Some(class) => tok_id(&class),
                None => tok_id("AnyInterface"),
            };
            quote! {
                #doc
                pub fn #fname(&self, #(#params),*) -> Proxy<#target> {
                    self.inner.marshal_constructor::<#target>(#opcode, &[#(#values),*])
                }
            }
        }
        None => {
            let destroy = if destructor {
                quote! { self.inner.destroy(); }
            } else {
                TokenStream::new()
            };
            quote! {
                #doc
                pub fn #fname(&self, #(#params),*) {
                    self.inner.marshal(#opcode, &[#(#values),*]);
                    #destroy
                }
            }
        }
    })
}

fn event_method(message: &Message) -> TokenStream {
    let fname = escaped_id(&message.fn_name());
    let opcode = Literal::u16_suffixed(message.opcode);
    let doc = doc_attr(&message.description);
    let params = message.args.iter().map(|arg| {
        let name = escaped_id(&arg.name);
        let ty = param_type(arg, Side::Resource);
        quote! { #name: #ty }
    });
    let values: Vec<TokenStream> = message
        .args
        .iter()
        .flat_map(|arg| wire_values(arg, Side::Resource))
        .collect();
    quote! {
        #doc
        pub fn #fname(&self, #(#params),*) {
            self.inner.post_event(#opcode, &[#(#values),*]);
        }
    }
}

fn interface_tokens(
    universe: &Universe,
    protocol: &Protocol,
    iface: &Interface,
) -> Result<TokenStream, EmitError> {
    let class = tok_id(&iface.class_name());
    let proxy = tok_id(&format!("{}Proxy", iface.class_name()));
    let resource = tok_id(&format!("{}Resource", iface.class_name()));
    let global = tok_id(&format!("{}Global", iface.class_name()));
    let name = &iface.name;
    let version = iface.version;
    let doc = doc_attr(&iface.description);

    let runtime = runtime_import(iface);
    let imports: Vec<TokenStream> = universe
        .imports_for(protocol, iface)?
        .iter()
        .map(|i| import_tokens(&i.path, &i.class))
        .collect();

    let requests = iface.requests.iter().map(|r| message_desc(&r.message));
    let events = iface.events.iter().map(|e| message_desc(&e.message));
    let enums = iface.enums.iter().map(enum_tokens);
    let request_fns = iface
        .requests
        .iter()
        .map(|r| request_method(&iface.name, &r.message, r.destructor))
        .collect::<Result<Vec<_>, EmitError>>()?;
    let event_fns = iface.events.iter().map(|e| event_method(&e.message));

    Ok(quote! {
        #runtime
        #(#imports)*

        #doc
        pub struct #class;

        impl Interface for #class {
            const NAME: &'static str = #name;
            const VERSION: u32 = #version;
            const REQUESTS: &'static [MessageDesc] = &[#(#requests),*];
            const EVENTS: &'static [MessageDesc] = &[#(#events),*];
        }

        #(#enums)*

        pub struct #proxy {
            pub inner: Proxy<#class>,
        }

        impl #proxy {
            #(#request_fns)*
        }

        pub struct #resource {
            pub inner: Resource<#class>,
        }

        impl #resource {
            #(#event_fns)*
        }

        pub type #global = Global<#class, #resource>;
    })
}

fn header(protocol: &Protocol) -> String {
    let mut out = String::new();
    if let Some(copyright) = &protocol.copyright {
        for line in copyright.body.lines() {
            if line.is_empty() {
                out.push_str("//\n");
            } else {
                out.push_str("// ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str("//\n");
    }
    out.push_str("// ");
    out.push_str(GENERATED_MARKER);
    out.push_str("\n\n");
    out
}

/// Render one interface module to formatted source.
pub fn emit_interface(
    universe: &Universe,
    protocol: &Protocol,
    iface: &Interface,
) -> Result<String, EmitError> {
    let tokens = interface_tokens(universe, protocol, iface)?;
    let file = syn::parse2::<syn::File>(tokens).map_err(|source| EmitError::Format {
        interface: iface.name.clone(),
        source,
    })?;
    let mut out = header(protocol);
    out.push_str(&prettyplease::unparse(&file));
    Ok(out)
}

/// The `mod.rs` manifest: module declarations plus re-exports of every
/// interface class, sorted by interface name for stable output.
pub fn emit_manifest(protocol: &Protocol) -> String {
    let mut names: Vec<&str> = protocol.interfaces.iter().map(|i| i.name.as_str()).collect();
    names.sort_unstable();
    let mut out = header(protocol);
    for name in &names {
        out.push_str(&format!("pub mod {name};\n"));
    }
    out.push('\n');
    for name in &names {
        out.push_str(&format!("pub use self::{name}::{};\n", to_camelcase(name)));
    }
    out
}

/// Render every file of one protocol: `(file name, contents)` pairs, the
/// manifest last. Nothing is written; a failing interface fails the whole
/// protocol before any I/O happens.
pub fn emit_protocol(
    universe: &Universe,
    protocol: &Protocol,
) -> Result<Vec<(String, String)>, EmitError> {
    let mut interfaces: Vec<&Interface> = protocol.interfaces.iter().collect();
    interfaces.sort_unstable_by(|a, b| a.name.cmp(&b.name));
    let mut files = Vec::with_capacity(interfaces.len() + 1);
    for iface in interfaces {
        files.push((
            format!("{}.rs", iface.name),
            emit_interface(universe, protocol, iface)?,
        ));
    }
    files.push(("mod.rs".to_string(), emit_manifest(protocol)));
    Ok(files)
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> EmitError + '_ {
    move |source| EmitError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write one protocol's module directory under `out_dir`. Files are
/// rendered first and staged in a temporary directory, which is renamed
/// into place only once complete, so a failed run never leaves a
/// half-written protocol directory behind.
pub fn write_protocol(
    universe: &Universe,
    protocol: &Protocol,
    out_dir: &Path,
) -> Result<(), EmitError> {
    let files = emit_protocol(universe, protocol)?;
    let module = protocol.module_name();
    let staging = out_dir.join(format!(".{module}.tmp"));
    let target = out_dir.join(&module);

    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(io_err(&staging))?;
    }
    fs::create_dir_all(&staging).map_err(io_err(&staging))?;
    for (name, contents) in &files {
        let path = staging.join(name);
        fs::write(&path, contents).map_err(io_err(&path))?;
    }
    if target.exists() {
        fs::remove_dir_all(&target).map_err(io_err(&target))?;
    }
    fs::rename(&staging, &target).map_err(io_err(&target))?;
    log::info!(
        "generated protocol `{}` ({} interfaces)",
        protocol.name,
        protocol.interfaces.len()
    );
    Ok(())
}
