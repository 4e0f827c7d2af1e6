//! Wire signature and type-array derivation.
//!
//! Signatures are modeled as structured tokens and only serialized to the
//! textual wire form at the emission boundary. Opcodes are not derived
//! here at all: they are the document-order index recorded on each
//! message at parse time.

use crate::protocol::{ArgType, Argument, Message};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Int,
    Uint,
    Fixed,
    Str,
    Object,
    /// `new_id` bound to a known interface; a single wire slot.
    NewId,
    /// `new_id` with no bound interface (the `wl_registry.bind` pattern):
    /// interface-name string, version uint, then the id. Three wire slots.
    DynNewId,
    Array,
    Fd,
}

impl TokenKind {
    fn wire_str(self) -> &'static str {
        match self {
            TokenKind::Int => "i",
            TokenKind::Uint => "u",
            TokenKind::Fixed => "f",
            TokenKind::Str => "s",
            TokenKind::Object => "o",
            TokenKind::NewId => "n",
            TokenKind::DynNewId => "sun",
            TokenKind::Array => "a",
            TokenKind::Fd => "h",
        }
    }

    /// Number of wire slots, and therefore of type-array entries.
    pub fn slots(self) -> usize {
        self.wire_str().len()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SigToken {
    pub kind: TokenKind,
    pub nullable: bool,
}

impl SigToken {
    pub fn of(arg: &Argument) -> SigToken {
        let kind = match arg.ty {
            ArgType::Int => TokenKind::Int,
            ArgType::Uint => TokenKind::Uint,
            ArgType::Fixed => TokenKind::Fixed,
            ArgType::String => TokenKind::Str,
            ArgType::Object => TokenKind::Object,
            ArgType::NewId if arg.interface.is_some() => TokenKind::NewId,
            ArgType::NewId => TokenKind::DynNewId,
            ArgType::Array => TokenKind::Array,
            ArgType::Fd => TokenKind::Fd,
        };
        SigToken {
            kind,
            nullable: arg.allow_null,
        }
    }
}

/// A message's complete wire signature.
#[derive(Debug, PartialEq, Eq)]
pub struct Signature {
    pub since: Option<u32>,
    pub tokens: Vec<SigToken>,
}

impl Signature {
    pub fn of(message: &Message) -> Signature {
        Signature {
            since: message.since,
            tokens: message.args.iter().map(SigToken::of).collect(),
        }
    }

    /// Serialize to the textual wire form. Version 1 is the implicit
    /// baseline and is never written; `?` goes in front of the whole
    /// fragment of a nullable argument.
    pub fn to_wire(&self) -> String {
        let mut s = String::new();
        if let Some(since) = self.since {
            if since > 1 {
                s.push_str(&since.to_string());
            }
        }
        for token in &self.tokens {
            if token.nullable {
                s.push('?');
            }
            s.push_str(token.kind.wire_str());
        }
        s
    }
}

/// The type array parallel to the signature: one entry per wire slot,
/// holding the bound interface's class name for bound `new_id`/`object`
/// arguments and `None` everywhere else. The unbound `new_id` case
/// contributes its three slots as three `None`s.
pub fn type_array(message: &Message) -> Vec<Option<String>> {
    let mut types = Vec::with_capacity(message.args.len());
    for arg in &message.args {
        match (arg.ty, arg.interface_class()) {
            (ArgType::Object | ArgType::NewId, Some(class)) => types.push(Some(class)),
            (ArgType::NewId, None) => types.extend([None, None, None]),
            _ => types.push(None),
        }
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ArgType;

    fn arg(ty: ArgType, interface: Option<&str>, allow_null: bool) -> Argument {
        Argument {
            name: "a".to_string(),
            ty,
            summary: None,
            interface: interface.map(str::to_string),
            allow_null,
            enum_: None,
        }
    }

    fn message(since: Option<u32>, args: Vec<Argument>) -> Message {
        Message {
            name: "m".to_string(),
            opcode: 0,
            since,
            description: None,
            args,
        }
    }

    #[test]
    fn base_signature_characters() {
        let m = message(
            None,
            vec![
                arg(ArgType::Int, None, false),
                arg(ArgType::Uint, None, false),
                arg(ArgType::Fixed, None, false),
                arg(ArgType::String, None, false),
                arg(ArgType::Object, None, false),
                arg(ArgType::Array, None, false),
                arg(ArgType::Fd, None, false),
            ],
        );
        assert_eq!(Signature::of(&m).to_wire(), "iufsoah");
    }

    #[test]
    fn bound_new_id_is_one_slot() {
        let m = message(None, vec![arg(ArgType::NewId, Some("wl_surface"), false)]);
        assert_eq!(Signature::of(&m).to_wire(), "n");
        assert_eq!(type_array(&m), vec![Some("WlSurface".to_string())]);
    }

    #[test]
    fn unbound_new_id_expands_to_three_slots() {
        let m = message(None, vec![arg(ArgType::NewId, None, false)]);
        assert_eq!(Signature::of(&m).to_wire(), "sun");
        assert_eq!(type_array(&m), vec![None, None, None]);
    }

    #[test]
    fn nullable_prepends_a_question_mark() {
        let m = message(
            None,
            vec![
                arg(ArgType::String, None, true),
                arg(ArgType::Object, Some("wl_surface"), true),
                arg(ArgType::Uint, None, false),
            ],
        );
        assert_eq!(Signature::of(&m).to_wire(), "?s?ou");
    }

    #[test]
    fn nullable_applies_to_the_whole_fragment() {
        // The compiler does not special-case a (schema-invalid) nullable
        // unbound new_id; the `?` lands in front of the whole fragment.
        let m = message(None, vec![arg(ArgType::NewId, None, true)]);
        assert_eq!(Signature::of(&m).to_wire(), "?sun");
    }

    #[test]
    fn since_greater_than_one_prefixes_the_version() {
        let m = message(Some(2), vec![arg(ArgType::Int, None, false)]);
        assert_eq!(Signature::of(&m).to_wire(), "2i");
        let m = message(Some(2), vec![]);
        assert_eq!(Signature::of(&m).to_wire(), "2");
        let m = message(Some(1), vec![arg(ArgType::Int, None, false)]);
        assert_eq!(Signature::of(&m).to_wire(), "i");
        let m = message(None, vec![arg(ArgType::Int, None, false)]);
        assert_eq!(Signature::of(&m).to_wire(), "i");
    }

    #[test]
    fn type_array_length_matches_wire_slots() {
        let m = message(
            Some(3),
            vec![
                arg(ArgType::NewId, None, false),
                arg(ArgType::Object, Some("wl_output"), false),
                arg(ArgType::String, None, true),
            ],
        );
        let sig = Signature::of(&m);
        let slot_count: usize = sig.tokens.iter().map(|t| t.kind.slots()).sum();
        assert_eq!(type_array(&m).len(), slot_count);
        assert_eq!(
            type_array(&m),
            vec![None, None, None, Some("WlOutput".to_string()), None]
        );
    }
}
