//! Facade crate: re-exports [`corestack_core`] plus whichever concrete
//! backend is enabled (`native` for sled, `web` for IndexedDB).
//!
//! Application code normally depends on this crate alone; the `-core`,
//! `-native`, `-web`, and `-ann` crates are split out so a WASM build
//! never pulls in sled, and a native build never pulls in `idb`.

pub use corestack_core::*;

#[cfg(feature = "native")]
pub use corestack_native as native;

#[cfg(feature = "web")]
pub use corestack_web as web;
