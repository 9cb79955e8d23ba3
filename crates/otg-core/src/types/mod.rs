//! Data model of one trading session: enums, records and the [`User`]
//! aggregate that owns them.

pub mod enums;
pub mod trading;
pub mod user;

pub use enums::*;
pub use trading::*;
pub use user::*;
