pub mod cli;
pub mod devices;
pub mod extension_control;
pub mod http;
pub mod instrumentation;
pub mod staging;
pub mod tasks;
pub mod upload;
