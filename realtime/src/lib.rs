// Realtime Notifier (Layer 2)
// Push channel between the signal service and its clients

pub mod client;
pub mod commands;
pub mod hub;
pub mod registry;
pub mod server;

pub use client::RealtimeClient;
pub use commands::{run_command_loop, Command, EXIT_ALL, EXIT_SIGNAL, PRICE_TICK};
pub use hub::NotifierHub;
pub use registry::{Handler, HandlerRegistry, Subscription};
pub use server::NotifierServer;
