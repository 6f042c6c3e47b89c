use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use esrt::{AggregateRootId, AggregateRootType, EventType, EventTypes};

pub const PERSON_ID: AggregateRootId = AggregateRootId::new(Uuid::from_u128(0x0a1));
pub const COUNTER_ID: AggregateRootId = AggregateRootId::new(Uuid::from_u128(0x0a2));
pub const PINGER_ID: AggregateRootId = AggregateRootId::new(Uuid::from_u128(0x0a3));
pub const BROKEN_ID: AggregateRootId = AggregateRootId::new(Uuid::from_u128(0x0a4));
pub const DRIFTING_ID: AggregateRootId = AggregateRootId::new(Uuid::from_u128(0x0a5));

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Renamed {
    pub name: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Incremented;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Doubled;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Pinged {
    pub at: u32,
}

/// Never associated with an event type.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Bogus {
    pub x: u32,
}

pub fn renamed() -> EventType {
    EventType::new(Uuid::from_u128(0x0e1)).with_alias("Renamed")
}

pub fn incremented() -> EventType {
    EventType::new(Uuid::from_u128(0x0e2)).with_alias("Incremented")
}

pub fn doubled() -> EventType {
    EventType::new(Uuid::from_u128(0x0e3)).with_alias("Doubled")
}

pub fn pinged() -> EventType {
    EventType::new(Uuid::from_u128(0x0e4)).with_alias("Pinged")
}

pub fn aggregate_root_type(id: AggregateRootId, alias: &str) -> AggregateRootType {
    AggregateRootType::new(id).with_alias(alias)
}

pub fn event_types() -> EventTypes {
    EventTypes::builder()
        .associate::<Renamed>(renamed())
        .and_then(|builder| builder.associate::<Incremented>(incremented()))
        .and_then(|builder| builder.associate::<Doubled>(doubled()))
        .and_then(|builder| builder.associate::<Pinged>(pinged()))
        .unwrap()
        .build()
}

#[derive(Debug)]
pub enum TestError {
    EmptyName,
    Refused,
}

impl Display for TestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "name cannot be empty"),
            Self::Refused => write!(f, "refused"),
        }
    }
}

impl std::error::Error for TestError {}
