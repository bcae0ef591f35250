//! Parameter-specific SQL handlers.
//!
//! Each handler generates the condition for one value of its parameter
//! type against an index row alias (`si` for plain parameters, `c0`, `c1`,
//! ... for composite components).

mod composite;
mod date;
mod number;
mod quantity;
mod reference;
mod string;
mod token;
mod uri;

pub use composite::CompositeHandler;
pub use date::DateHandler;
pub use number::NumberHandler;
pub use quantity::QuantityHandler;
pub use reference::ReferenceHandler;
pub use string::StringHandler;
pub use token::TokenHandler;
pub use uri::UriHandler;
