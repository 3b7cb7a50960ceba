//! Schema registry - mapping command ids to schema codecs.
//!
//! The registry is built once during connection setup and is immutable
//! while traffic flows: codecs hold it by value and never mutate it during
//! decode. Commands without a registered schema are not an error; their
//! bodies pass through as raw bytes.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FramelinkError, Result};
use crate::protocol::Message;

/// External capability that (de)serializes a structured message body for
/// one command id.
pub trait MessageSchema: Send + Sync {
    /// Parse body bytes into a structured message.
    ///
    /// A parse failure here is a fatal framing error for the connection
    /// that received the bytes.
    fn decode(&self, body: &[u8]) -> Result<Box<dyn Message>>;

    /// Serialize a structured message into body bytes.
    fn encode(&self, command: u16, message: &dyn Message) -> Result<Vec<u8>>;
}

/// MessagePack schema codec for a concrete message type.
///
/// Uses `rmp_serde::to_vec_named` so structs serialize as maps with field
/// names, interoperable with msgpack peers in other languages.
pub struct MsgPackSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> MsgPackSchema<T> {
    /// Create a schema codec for `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for MsgPackSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageSchema for MsgPackSchema<T>
where
    T: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    fn decode(&self, body: &[u8]) -> Result<Box<dyn Message>> {
        let message: T = rmp_serde::from_slice(body)?;
        Ok(Box::new(message))
    }

    fn encode(&self, command: u16, message: &dyn Message) -> Result<Vec<u8>> {
        let message = message
            .as_any()
            .downcast_ref::<T>()
            .ok_or(FramelinkError::SchemaMismatch(command))?;
        Ok(rmp_serde::to_vec_named(message)?)
    }
}

/// Registry mapping command ids to schema codecs.
///
/// Not safe to mutate concurrently with decoding; register everything
/// before handing the registry to a codec.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: HashMap<u16, Arc<dyn MessageSchema>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Register a schema codec for a command, replacing any previous one.
    pub fn register(&mut self, command: u16, schema: Arc<dyn MessageSchema>) {
        self.schemas.insert(command, schema);
    }

    /// Register a MessagePack schema for `T` under a command.
    pub fn register_msgpack<T>(&mut self, command: u16)
    where
        T: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
    {
        self.register(command, Arc::new(MsgPackSchema::<T>::new()));
    }

    /// Resolve the schema for a command.
    pub fn resolve(&self, command: u16) -> Option<&Arc<dyn MessageSchema>> {
        self.schemas.get(&command)
    }
}
