//! Database models split into domain-specific modules.
//!
//! Each model carries the queries that read and write its table.

pub mod artist;
pub mod artwork;
pub mod cart;
pub mod common;
pub mod order;
pub mod otp;
pub mod setting;
pub mod shipping;
pub mod user;

pub use artist::*;
pub use artwork::*;
pub use cart::*;
pub use common::*;
pub use order::*;
pub use otp::*;
pub use setting::*;
pub use shipping::*;
pub use user::*;
