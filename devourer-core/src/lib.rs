pub mod errors;
pub mod filter;
pub mod models;
pub mod observable;
pub mod protocol;

pub use errors::*;
pub use filter::*;
pub use models::*;
pub use observable::*;
pub use protocol::*;
