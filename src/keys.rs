//! Cache key composition
//!
//! Every cached object lives under an entity-type prefix followed by the
//! entity identifier, e.g. `realty:5f1c…`. Prefixes double as the argument to
//! `remove_prefix` when a whole entity family is invalidated.

pub const REALTY_PREFIX: &str = "realty:";
pub const USER_PREFIX: &str = "user:";
pub const TRANSACTION_PREFIX: &str = "transaction:";
pub const CONTRACT_PREFIX: &str = "contract:";

pub fn realty_key(id: &str) -> String {
    format!("{REALTY_PREFIX}{id}")
}

pub fn user_key(id: &str) -> String {
    format!("{USER_PREFIX}{id}")
}

pub fn transaction_key(id: &str) -> String {
    format!("{TRANSACTION_PREFIX}{id}")
}

pub fn contract_key(id: &str) -> String {
    format!("{CONTRACT_PREFIX}{id}")
}
