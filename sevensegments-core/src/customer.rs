//! Customer identifier sets
//!
//! The API references a customer by a map of identifier namespace to value,
//! e.g. `{"registered": "jane@example.com"}`. An anonymous session sends an
//! empty map, never `null`.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Namespace used when a customer is given as a bare string
pub const REGISTERED: &str = "registered";

/// Identifier map sent in the `customer_ids` / `ids` payload slots
pub type CustomerIds = BTreeMap<String, String>;

/// Who the client is currently acting for
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(untagged)]
pub enum Customer {
    /// No customer bound
    #[default]
    Anonymous,
    /// Registered customer id, sent as `{"registered": id}`
    Registered(String),
    /// Explicit identifier map, sent verbatim
    Ids(CustomerIds),
}

impl Customer {
    /// Identifier map for payloads
    pub fn into_ids(self) -> CustomerIds {
        match self {
            Customer::Anonymous => CustomerIds::new(),
            Customer::Registered(id) => CustomerIds::from([(REGISTERED.to_string(), id)]),
            Customer::Ids(ids) => ids,
        }
    }
}

impl From<&str> for Customer {
    fn from(id: &str) -> Self {
        Customer::Registered(id.to_string())
    }
}

impl From<String> for Customer {
    fn from(id: String) -> Self {
        Customer::Registered(id)
    }
}

impl From<CustomerIds> for Customer {
    fn from(ids: CustomerIds) -> Self {
        Customer::Ids(ids)
    }
}

impl From<HashMap<String, String>> for Customer {
    fn from(ids: HashMap<String, String>) -> Self {
        Customer::Ids(ids.into_iter().collect())
    }
}

impl<T: Into<Customer>> From<Option<T>> for Customer {
    fn from(customer: Option<T>) -> Self {
        customer.map(Into::into).unwrap_or_default()
    }
}

impl TryFrom<Value> for Customer {
    type Error = Error;

    /// Accepts `null`, a string, or an object whose values are all strings.
    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Customer::Anonymous),
            Value::String(id) => Ok(Customer::Registered(id)),
            Value::Object(map) => map
                .into_iter()
                .map(|(namespace, id)| match id {
                    Value::String(id) => Ok((namespace, id)),
                    other => Err(Error::InvalidInput(format!(
                        "customer id '{}' must be a string, got {}",
                        namespace, other
                    ))),
                })
                .collect::<Result<CustomerIds>>()
                .map(Customer::Ids),
            other => Err(Error::InvalidInput(format!(
                "customer must be null, a string or an object, got {}",
                other
            ))),
        }
    }
}
