//! Command implementations.

mod info;
mod inspect_take;
mod run;
mod validate;

pub use info::run_info;
pub use inspect_take::run_inspect_take;
pub use run::run_pipeline;
pub use validate::run_validate;
