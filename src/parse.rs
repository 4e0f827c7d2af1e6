//! Pull parser from protocol XML to the domain model.
//!
//! One `<protocol>` document per input; the parser walks the tree with
//! quick-xml and fails fast on anything the schema grammar does not
//! allow. Unknown elements are skipped wholesale so that schema
//! extensions (e.g. `deprecated-since`) do not break older inputs.

use crate::element::{flag_attr, optional_attr, required_attr, tag_name, trim_text, AttrError};
use crate::protocol::{
    ArgType, Argument, Copyright, Description, Entry, Enum, Event, Interface, Message, Protocol,
    Request,
};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not read the next XML event")]
    ReadEvent(#[from] quick_xml::Error),
    #[error(transparent)]
    Attr(#[from] AttrError),
    #[error("input is not a Wayland protocol document (no <protocol> root)")]
    MissingProtocol,
    #[error("could not parse the `version` attribute of interface `{interface}`")]
    InvalidVersion {
        interface: String,
        #[source]
        source: ParseIntError,
    },
    #[error("could not parse the `since` attribute of <{element}> `{name}`")]
    InvalidSince {
        element: &'static str,
        name: String,
        #[source]
        source: ParseIntError,
    },
    #[error("unknown type `{ty}` on argument `{name}`")]
    UnknownArgType { name: String, ty: String },
    #[error("unknown type `{ty}` on request `{name}`")]
    UnknownRequestType { name: String, ty: String },
    #[error("could not parse the value `{value}` of enum entry `{name}`")]
    InvalidEntryValue {
        name: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("interface `{interface}` has too many {kind}s for a 16-bit opcode")]
    OpcodeOverflow {
        interface: String,
        kind: &'static str,
    },
}

type XmlReader<'a> = Reader<&'a [u8]>;

/// Parse a single protocol document.
pub fn parse(input: &[u8]) -> Result<Protocol, ParseError> {
    let mut reader = Reader::from_reader(input);
    loop {
        let event = reader.read_event()?;
        let (start, empty) = match event {
            XmlEvent::Start(s) => (s, false),
            XmlEvent::Empty(s) => (s, true),
            XmlEvent::Eof => return Err(ParseError::MissingProtocol),
            _ => continue,
        };
        if start.local_name().as_ref() == b"protocol" {
            return parse_protocol(&mut reader, &start, empty);
        }
        skip_unknown(&mut reader, &start, empty)?;
    }
}

/// Step into the next child element, handing back its start tag and
/// whether it is self-closing; `None` once the enclosing element ends.
fn next_child<'a>(
    reader: &mut XmlReader<'a>,
) -> Result<Option<(BytesStart<'a>, bool)>, ParseError> {
    loop {
        return Ok(match reader.read_event()? {
            XmlEvent::Start(s) => Some((s, false)),
            XmlEvent::Empty(s) => Some((s, true)),
            XmlEvent::End(_) | XmlEvent::Eof => None,
            _ => continue,
        });
    }
}

fn skip_unknown(reader: &mut XmlReader, start: &BytesStart, empty: bool) -> Result<(), ParseError> {
    log::debug!("skipping unknown element <{}>", tag_name(start));
    if !empty {
        reader.read_to_end(start.name())?;
    }
    Ok(())
}

fn parse_since(
    start: &BytesStart,
    element: &'static str,
    name: &str,
) -> Result<Option<u32>, ParseError> {
    match optional_attr(start, "since")? {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|source| ParseError::InvalidSince {
                element,
                name: name.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

fn parse_protocol(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
) -> Result<Protocol, ParseError> {
    let name = required_attr(start, "name")?;
    let mut copyright = None;
    let mut description = None;
    let mut interfaces = Vec::new();
    if !empty {
        while let Some((child, empty)) = next_child(reader)? {
            match child.local_name().as_ref() {
                b"copyright" => copyright = Some(parse_copyright(reader, empty)?),
                b"description" => description = Some(parse_description(reader, &child, empty)?),
                b"interface" => interfaces.push(parse_interface(reader, &child, empty)?),
                _ => skip_unknown(reader, &child, empty)?,
            }
        }
    }
    Ok(Protocol {
        name,
        copyright,
        description,
        interfaces,
    })
}

fn parse_copyright(reader: &mut XmlReader, empty: bool) -> Result<Copyright, ParseError> {
    let mut body = String::new();
    if !empty {
        loop {
            match reader.read_event()? {
                XmlEvent::Text(t) => body.push_str(&t.unescape()?),
                XmlEvent::CData(t) => body.push_str(&String::from_utf8_lossy(&t)),
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => continue,
            }
        }
    }
    Ok(Copyright {
        body: trim_text(&body),
    })
}

fn parse_description(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
) -> Result<Description, ParseError> {
    let summary = optional_attr(start, "summary")?;
    let mut body = String::new();
    if !empty {
        loop {
            match reader.read_event()? {
                XmlEvent::Text(t) => body.push_str(&t.unescape()?),
                XmlEvent::End(_) | XmlEvent::Eof => break,
                _ => continue,
            }
        }
    }
    Ok(Description {
        summary,
        body: trim_text(&body),
    })
}

fn parse_interface(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
) -> Result<Interface, ParseError> {
    let name = required_attr(start, "name")?;
    let version = required_attr(start, "version")?
        .parse()
        .map_err(|source| ParseError::InvalidVersion {
            interface: name.clone(),
            source,
        })?;
    let mut description = None;
    let mut enums = Vec::new();
    let mut requests: Vec<Request> = Vec::new();
    let mut events: Vec<Event> = Vec::new();
    if !empty {
        while let Some((child, empty)) = next_child(reader)? {
            match child.local_name().as_ref() {
                b"description" => description = Some(parse_description(reader, &child, empty)?),
                b"enum" => enums.push(parse_enum(reader, &child, empty)?),
                b"request" => {
                    let opcode = opcode_for(&name, "request", requests.len())?;
                    requests.push(parse_request(reader, &child, empty, opcode)?);
                }
                b"event" => {
                    let opcode = opcode_for(&name, "event", events.len())?;
                    events.push(Event {
                        message: parse_message(reader, &child, empty, opcode, "event")?,
                    });
                }
                _ => skip_unknown(reader, &child, empty)?,
            }
        }
    }
    Ok(Interface {
        name,
        version,
        description,
        enums,
        requests,
        events,
    })
}

fn opcode_for(interface: &str, kind: &'static str, index: usize) -> Result<u16, ParseError> {
    u16::try_from(index).map_err(|_| ParseError::OpcodeOverflow {
        interface: interface.to_string(),
        kind,
    })
}

fn parse_request(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
    opcode: u16,
) -> Result<Request, ParseError> {
    let destructor = match optional_attr(start, "type")?.as_deref() {
        None | Some("") => false,
        Some("destructor") => true,
        Some(ty) => {
            return Err(ParseError::UnknownRequestType {
                name: required_attr(start, "name")?,
                ty: ty.to_string(),
            })
        }
    };
    Ok(Request {
        destructor,
        message: parse_message(reader, start, empty, opcode, "request")?,
    })
}

fn parse_message(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
    opcode: u16,
    element: &'static str,
) -> Result<Message, ParseError> {
    let name = required_attr(start, "name")?;
    let since = parse_since(start, element, &name)?;
    let mut description = None;
    let mut args = Vec::new();
    if !empty {
        while let Some((child, empty)) = next_child(reader)? {
            match child.local_name().as_ref() {
                b"description" => description = Some(parse_description(reader, &child, empty)?),
                b"arg" => args.push(parse_arg(reader, &child, empty)?),
                _ => skip_unknown(reader, &child, empty)?,
            }
        }
    }
    Ok(Message {
        name,
        opcode,
        since,
        description,
        args,
    })
}

fn parse_arg(reader: &mut XmlReader, start: &BytesStart, empty: bool) -> Result<Argument, ParseError> {
    let name = required_attr(start, "name")?;
    let ty = match required_attr(start, "type")?.as_str() {
        "int" => ArgType::Int,
        "uint" => ArgType::Uint,
        "fixed" => ArgType::Fixed,
        "string" => ArgType::String,
        "object" => ArgType::Object,
        "new_id" => ArgType::NewId,
        "array" => ArgType::Array,
        "fd" => ArgType::Fd,
        other => {
            return Err(ParseError::UnknownArgType {
                name,
                ty: other.to_string(),
            })
        }
    };
    let summary = optional_attr(start, "summary")?;
    let interface = optional_attr(start, "interface")?;
    let allow_null = flag_attr(start, "allow-null")?;
    let enum_ = optional_attr(start, "enum")?;
    if !empty {
        // The DTD allows a description child; nothing in the model needs it.
        reader.read_to_end(start.name())?;
    }
    Ok(Argument {
        name,
        ty,
        summary,
        interface,
        allow_null,
        enum_,
    })
}

fn parse_enum(reader: &mut XmlReader, start: &BytesStart, empty: bool) -> Result<Enum, ParseError> {
    let name = required_attr(start, "name")?;
    let since = parse_since(start, "enum", &name)?;
    let bitfield = flag_attr(start, "bitfield")?;
    let mut description = None;
    let mut entries = Vec::new();
    if !empty {
        while let Some((child, empty)) = next_child(reader)? {
            match child.local_name().as_ref() {
                b"description" => description = Some(parse_description(reader, &child, empty)?),
                b"entry" => entries.push(parse_entry(reader, &child, empty)?),
                _ => skip_unknown(reader, &child, empty)?,
            }
        }
    }
    Ok(Enum {
        name,
        since,
        bitfield,
        description,
        entries,
    })
}

fn parse_entry(reader: &mut XmlReader, start: &BytesStart, empty: bool) -> Result<Entry, ParseError> {
    let name = required_attr(start, "name")?;
    let value = required_attr(start, "value")?;
    let value_u32 = parse_uint(&value).map_err(|source| ParseError::InvalidEntryValue {
        name: name.clone(),
        value: value.clone(),
        source,
    })?;
    let summary = optional_attr(start, "summary")?;
    let since = parse_since(start, "entry", &name)?;
    if !empty {
        reader.read_to_end(start.name())?;
    }
    Ok(Entry {
        name,
        value,
        value_u32,
        summary,
        since,
    })
}

fn parse_uint(s: &str) -> Result<u32, ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<protocol name="wayland">
  <copyright>
    Copyright 2015 the authors.
  </copyright>
  <interface name="wl_display" version="1">
    <description summary="core global object">
      The core global object.
    </description>
    <request name="sync">
      <arg name="callback" type="new_id" interface="wl_callback"/>
    </request>
    <request name="get_registry">
      <arg name="registry" type="new_id" interface="wl_registry"/>
    </request>
    <event name="error">
      <arg name="object_id" type="object"/>
      <arg name="code" type="uint"/>
      <arg name="message" type="string"/>
    </event>
    <enum name="error">
      <entry name="invalid_object" value="0" summary="server couldn't find object"/>
      <entry name="invalid_method" value="1"/>
    </enum>
  </interface>
  <interface name="wl_registry" version="1">
    <request name="bind">
      <arg name="name" type="uint"/>
      <arg name="id" type="new_id"/>
    </request>
    <event name="global" since="2">
      <arg name="name" type="uint"/>
      <arg name="interface" type="string"/>
      <arg name="version" type="uint"/>
    </event>
  </interface>
</protocol>
"#;

    #[test]
    fn parses_whole_protocol() {
        let p = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(p.name, "wayland");
        assert_eq!(
            p.copyright.as_ref().unwrap().body,
            "Copyright 2015 the authors."
        );
        assert_eq!(p.interfaces.len(), 2);

        let display = &p.interfaces[0];
        assert_eq!(display.name, "wl_display");
        assert_eq!(display.version, 1);
        assert_eq!(display.requests.len(), 2);
        assert_eq!(display.events.len(), 1);
        assert_eq!(display.enums.len(), 1);
        assert_eq!(
            display.description.as_ref().unwrap().summary.as_deref(),
            Some("core global object")
        );
    }

    #[test]
    fn opcodes_follow_document_order_per_kind() {
        let p = parse(SAMPLE.as_bytes()).unwrap();
        let display = &p.interfaces[0];
        assert_eq!(display.requests[0].message.name, "sync");
        assert_eq!(display.requests[0].message.opcode, 0);
        assert_eq!(display.requests[1].message.name, "get_registry");
        assert_eq!(display.requests[1].message.opcode, 1);
        // Events restart at 0 no matter how many requests there are.
        assert_eq!(display.events[0].message.opcode, 0);
    }

    #[test]
    fn arg_attributes_round_trip() {
        let p = parse(SAMPLE.as_bytes()).unwrap();
        let bind = &p.interfaces[1].requests[0].message;
        assert_eq!(bind.args[1].ty, ArgType::NewId);
        assert!(bind.args[1].interface.is_none());
        let error = &p.interfaces[0].events[0].message;
        assert_eq!(error.args[0].ty, ArgType::Object);
        assert!(!error.args[0].allow_null);
    }

    #[test]
    fn since_is_parsed_on_messages() {
        let p = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(p.interfaces[1].events[0].message.since, Some(2));
        assert_eq!(p.interfaces[0].requests[0].message.since, None);
    }

    #[test]
    fn missing_required_attribute_is_an_error() {
        let err = parse(br#"<protocol name="p"><interface name="i"/></protocol>"#).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("interface"), "{msg}");
        assert!(msg.contains("version"), "{msg}");
    }

    #[test]
    fn unknown_arg_type_is_an_error() {
        let err = parse(
            br#"<protocol name="p">
                 <interface name="i" version="1">
                   <request name="r"><arg name="a" type="double"/></request>
                 </interface>
               </protocol>"#,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::UnknownArgType { ref ty, .. } if ty == "double"));
    }

    #[test]
    fn unknown_request_type_is_an_error() {
        let err = parse(
            br#"<protocol name="p">
                 <interface name="i" version="1">
                   <request name="r" type="constructor"/>
                 </interface>
               </protocol>"#,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::UnknownRequestType { .. }));
    }

    #[test]
    fn destructor_requests_are_flagged() {
        let p = parse(
            br#"<protocol name="p">
                 <interface name="i" version="1">
                   <request name="destroy" type="destructor"/>
                 </interface>
               </protocol>"#,
        )
        .unwrap();
        assert!(p.interfaces[0].requests[0].destructor);
    }

    #[test]
    fn hex_entry_values_are_accepted() {
        let p = parse(
            br#"<protocol name="p">
                 <interface name="i" version="1">
                   <enum name="format"><entry name="argb8888" value="0xab"/></enum>
                 </interface>
               </protocol>"#,
        )
        .unwrap();
        let entry = &p.interfaces[0].enums[0].entries[0];
        assert_eq!(entry.value_u32, 0xab);
        assert_eq!(entry.normalized_value(), "0xAB");
    }

    #[test]
    fn document_without_protocol_root_is_rejected() {
        assert!(matches!(
            parse(b"<interfaces/>").unwrap_err(),
            ParseError::MissingProtocol
        ));
    }

    #[test]
    fn unknown_elements_are_skipped() {
        let p = parse(
            br#"<protocol name="p">
                 <interface name="i" version="1">
                   <request name="r" deprecated-since="3">
                     <future><nested/></future>
                   </request>
                 </interface>
               </protocol>"#,
        )
        .unwrap();
        assert_eq!(p.interfaces[0].requests.len(), 1);
    }
}
