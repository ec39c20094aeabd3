pub mod config;
pub mod decision;
pub mod error;
pub mod error_utils;
pub mod forum;
pub mod keywords;
pub mod sink;
pub mod store;
pub mod types;

pub use config::*;
pub use decision::*;
pub use error::*;
pub use error_utils::*;
pub use forum::*;
pub use keywords::*;
pub use sink::*;
pub use store::*;
pub use types::*;
