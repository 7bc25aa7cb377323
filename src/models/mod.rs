//! Request-scoped records exchanged between the token gate, the handlers and
//! the storage service. Nothing here is persisted; each value lives for one
//! request and serializes straight into the JSON responses.

pub mod identity;
pub mod listing;
pub mod upload;
