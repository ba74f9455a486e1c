pub mod background;
pub mod cli;
pub mod error;
pub mod registry;
pub mod run;
pub mod settings;
pub mod sidecar;
pub mod sink;
pub mod source;
pub mod stage;
