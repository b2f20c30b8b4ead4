//! This mod is meant to hold most of the code for the library's client-facing API.
mod admin;
mod client;
mod event_bus;
mod options;
mod wiring;

pub use admin::AdminRequest;
pub use admin::AdminResponse;
pub use client::GridNode;
pub use client::NodeRequestError;
pub use event_bus::ExchangeEvent;
pub use event_bus::ExchangeEventListener;
pub use options::ExchangeOptions;
pub use wiring::try_create_grid_node;
pub use wiring::try_create_grpc_grid_node;
pub use wiring::GridNodeConfig;
pub use wiring::GridNodeCreationError;
