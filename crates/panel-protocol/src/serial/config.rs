//! Configuration stubs backed by a [`KeyValueStore`].

use std::sync::Arc;

use tracing::{debug, warn};

use super::{command, parse_count, prefixed, reply, split_first};
use crate::kv::{ItemType, KeyValueStore};
use crate::stub::{ParserStub, StubBase, StubReply};

/// `AT+SETCONF=<namespace>,<key>,<type code>,<value>`.
///
/// The value is everything after the third comma. A key keeps the type of
/// its first write.
pub struct SetConfigStub {
    base: StubBase,
    store: Arc<dyn KeyValueStore>,
}

impl SetConfigStub {
    /// A stub writing into `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            base: StubBase::new(command::SET_CONF),
            store,
        }
    }
}

impl ParserStub for SetConfigStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        let failure = StubReply::error(self.base.message_type(), reply::ERROR);
        let (namespace, rest) = split_first(data, ',');
        let (key, rest) = split_first(rest, ',');
        let (type_code, value) = split_first(rest, ',');

        if namespace.is_empty() || key.is_empty() || type_code.is_empty() || value.is_empty() {
            debug!("one of the parameters is missing");
            return failure;
        }
        let Some(item_type) = parse_count::<u32>(type_code).and_then(ItemType::from_code) else {
            debug!(type_code, "type parameter is not a known type code");
            return failure;
        };
        let stored = self.store.get_type(namespace, key);
        if stored != ItemType::Any && stored != item_type {
            warn!(namespace, key, %stored, requested = %item_type, "provided type differs from stored type");
            return failure;
        }

        match self.store.set_item(namespace, key, item_type, value) {
            Ok(()) => StubReply::ok(self.base.message_type(), reply::OK),
            Err(e) => {
                warn!(namespace, key, error = %e, "cannot assign value to key");
                failure
            }
        }
    }
}

/// `AT+GETCONF=<namespace>,<key>`, replying `VALUE=<type code>,<value>`.
pub struct GetConfigStub {
    base: StubBase,
    store: Arc<dyn KeyValueStore>,
}

impl GetConfigStub {
    /// A stub reading from `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            base: StubBase::new(command::GET_CONF),
            store,
        }
    }
}

impl ParserStub for GetConfigStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        let (namespace, key) = split_first(data, ',');
        if namespace.is_empty() || key.is_empty() {
            return StubReply::error(self.base.message_type(), reply::ERROR);
        }
        let item_type = self.store.get_type(namespace, key);
        let value = match item_type {
            t if t.is_textual() => self.store.get_string(namespace, key, ""),
            t if t.is_numeric() => self
                .store
                .get_item(namespace, key)
                .map(|v| v.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        StubReply::ok(
            self.base.message_type(),
            prefixed(reply::VALUE, format!("{},{value}", item_type.code())),
        )
    }
}

/// `AT+DELCONF=<namespace>,<key>`.
pub struct DelConfigStub {
    base: StubBase,
    store: Arc<dyn KeyValueStore>,
}

impl DelConfigStub {
    /// A stub erasing keys of `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            base: StubBase::new(command::DEL_CONF),
            store,
        }
    }
}

impl ParserStub for DelConfigStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        let (namespace, key) = split_first(data, ',');
        if namespace.is_empty() || key.is_empty() {
            return StubReply::error(self.base.message_type(), reply::ERROR);
        }
        match self.store.erase_item(namespace, key) {
            Ok(()) => StubReply::ok(self.base.message_type(), reply::OK),
            Err(e) => {
                debug!(namespace, key, error = %e, "cannot erase key");
                StubReply::error(self.base.message_type(), reply::ERROR)
            }
        }
    }
}
