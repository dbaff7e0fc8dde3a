// Library root: exposes the HTTP layer so integration tests can drive it.

pub mod api;
pub mod protocol;
