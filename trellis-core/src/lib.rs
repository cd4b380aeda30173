//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis UI framework.
//! It implements:
//!
//! - A retained view tree with minimal-mutation reconciliation
//! - A frame-gated engine loop with a single tree consumer
//! - A broadcast action bus and scoped state store
//! - Route-table navigation with external-link detection
//! - Pluggable platform and storage backends
//!
//! The crate is host-agnostic: it computes what should change and hands
//! the changes to a [`Platform`](platform::Platform) implementation. A
//! browser binding applies them to the DOM; a recorder applies them to
//! a log; a server renders markup without any host at all.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `tree`: views, components, the retained tree, and the reconciler
//! - `engine`: the loop, frame scheduler, contexts, and navigation
//! - `action`: named action routing to registered handlers
//! - `state`: scoped state with expiry and persistence
//! - `platform`: the mutation stream consumed by hosts
//! - `storage`: key-value backends for persisted state
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::{Component, Context, Engine, View};
//!
//! struct Counter;
//!
//! impl Component for Counter {
//!     fn render(&mut self, ctx: &mut Context<'_>) -> View {
//!         let count: u64 = ctx.get_state("count").unwrap_or(0);
//!         View::element("button")
//!             .attr("class", "counter")
//!             .on("click", |ctx, _event| {
//!                 let count: u64 = ctx.get_state("count").unwrap_or(0);
//!                 ctx.set_state("count", &(count + 1));
//!                 ctx.update();
//!             })
//!             .child(View::text(format!("clicked {count} times")))
//!             .build()
//!     }
//! }
//!
//! # async fn main_loop() -> Result<(), trellis_core::EngineError> {
//! let mut engine = Engine::builder()
//!     .route("/", || View::component(Counter))
//!     .build();
//! engine.navigate("/")?;
//! engine.run(0).await
//! # }
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod platform;
pub mod state;
pub mod storage;
pub mod tree;

pub use engine::{Context, Engine, Handle};
pub use error::EngineError;
pub use tree::{Component, View};
