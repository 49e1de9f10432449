//! Token-level JSON reading
//!
//! Drives `serde_json`'s streaming deserializer with a visitor that turns
//! every token into an [`Event`] instead of building a tree, so a page of any
//! size is read in constant memory.

use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use std::fmt;
use std::io::{BufReader, Read};

use crate::{Error, Result};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// One token of a JSON document
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event<'a> {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    Key(&'a str),
    String(&'a str),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Event<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StartObject => "object start",
            Event::EndObject => "object end",
            Event::StartArray => "array start",
            Event::EndArray => "array end",
            Event::Key(_) => "key",
            Event::String(_) => "string",
            Event::Integer(_) | Event::Unsigned(_) | Event::Float(_) => "number",
            Event::Bool(_) => "boolean",
            Event::Null => "null",
        }
    }
}

/// Receives the events of one document in order
pub trait EventHandler {
    fn event(&mut self, event: Event<'_>) -> Result<()>;
}

/// Read one JSON document from `reader`, passing each token to `handler`.
///
/// An error returned by the handler stops the read and is returned as is.
pub fn read_events<R: Read, H: EventHandler>(reader: R, handler: &mut H) -> Result<()> {
    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
    let mut de = serde_json::Deserializer::from_reader(reader);
    let mut driver = Driver {
        handler,
        failure: None,
    };

    let outcome = EventSeed {
        driver: &mut driver,
    }
    .deserialize(&mut de);

    if let Some(failure) = driver.failure.take() {
        return Err(failure);
    }
    outcome?;
    de.end()?;
    Ok(())
}

struct Driver<'h, H> {
    handler: &'h mut H,
    // serde errors cannot carry our error type, so the handler's error is parked here
    failure: Option<Error>,
}

impl<H: EventHandler> Driver<'_, H> {
    fn emit<E: de::Error>(&mut self, event: Event<'_>) -> Result<(), E> {
        match self.handler.event(event) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.failure = Some(err);
                Err(E::custom("event handler failed"))
            }
        }
    }
}

struct EventSeed<'a, 'h, H> {
    driver: &'a mut Driver<'h, H>,
}

impl<'de, H: EventHandler> DeserializeSeed<'de> for EventSeed<'_, '_, H> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de, H: EventHandler> Visitor<'de> for EventSeed<'_, '_, H> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<(), E> {
        self.driver.emit(Event::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<(), E> {
        self.driver.emit(Event::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<(), E> {
        self.driver.emit(Event::Unsigned(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<(), E> {
        self.driver.emit(Event::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        self.driver.emit(Event::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.driver.emit(Event::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        self.driver.emit(Event::StartArray)?;
        while seq
            .next_element_seed(EventSeed {
                driver: &mut *self.driver,
            })?
            .is_some()
        {}
        self.driver.emit(Event::EndArray)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        self.driver.emit(Event::StartObject)?;
        while map
            .next_key_seed(KeySeed {
                driver: &mut *self.driver,
            })?
            .is_some()
        {
            map.next_value_seed(EventSeed {
                driver: &mut *self.driver,
            })?;
        }
        self.driver.emit(Event::EndObject)
    }
}

struct KeySeed<'a, 'h, H> {
    driver: &'a mut Driver<'h, H>,
}

impl<'de, H: EventHandler> DeserializeSeed<'de> for KeySeed<'_, '_, H> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_str(self)
    }
}

impl<'de, H: EventHandler> Visitor<'de> for KeySeed<'_, '_, H> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object key")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        self.driver.emit(Event::Key(v))
    }
}
