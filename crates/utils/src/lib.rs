pub mod event_bus;
pub mod logging;
pub mod response;
