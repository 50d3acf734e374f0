//! Data structures shared across the API, storage and billing crates.

mod admin;
mod billing;
mod engagement;
mod image;
mod payment;
mod plan;
mod subscription;
mod tenant;

pub use admin::*;
pub use billing::*;
pub use engagement::*;
pub use image::*;
pub use payment::*;
pub use plan::*;
pub use subscription::*;
pub use tenant::*;
