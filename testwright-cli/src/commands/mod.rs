//! CLI command implementations

pub mod run;
pub mod secrets;

pub use run::RunArgs;
pub use secrets::SecretsArgs;
