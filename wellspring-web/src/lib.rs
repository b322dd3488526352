//! Web front-controller layer over [wellspring_context]: deployment bootstrap with a shared
//! root context and per-dispatcher child contexts, pattern-based handler mapping with
//! interceptors, and a dispatcher routing every HTTP method through one entry point with
//! argument resolution and request-scoped thread-local state.
//!
//! The crate is server-agnostic: requests and responses are plain values over [http] types, so
//! any transport can feed the [Dispatcher](dispatch::Dispatcher).

pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod handler;
pub mod request;
pub mod response;

pub use dispatch::Dispatcher;
pub use handler::{Handler, HandlerExecutionChain, HandlerMapping, PathPatternHandlerMapping};
pub use request::{RequestContextHolder, WebRequest};
pub use response::WebResponse;
