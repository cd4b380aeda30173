//! Component State
//!
//! The state store holds keyed JSON values scoped to the component that
//! wrote them. It is where a component keeps anything that must survive
//! its own re-renders, since the instance itself is replaced whenever a
//! parent re-renders it.
//!
//! Entries can carry an expiry policy and can be mirrored into the
//! persistent storage collaborator, which is how values survive a full
//! restart of the runtime. Scope buckets are released when the owning
//! component leaves the tree; a per-frame sweep handles expiry.
//!
//! Components use the typed layer on
//! [`Context`](crate::engine::Context::set_state) rather than this store
//! directly.

mod store;

pub use store::{Expiry, StateOptions, StateStore};
