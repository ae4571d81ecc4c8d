mod common;
pub use common::*;

pub(crate) mod admission_script;
pub use admission_script::ADMISSION_SCRIPT;

mod script_store;
pub use script_store::*;

mod window_options;
pub use window_options::*;

mod window_rate_limiter;
pub use window_rate_limiter::*;
