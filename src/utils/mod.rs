pub mod id;
pub mod logging;
