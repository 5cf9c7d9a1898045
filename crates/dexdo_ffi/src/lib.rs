//! Flutter-facing bindings for `dexdo_core`.

pub mod api;
