//! Business services. Each one works against the storage traits and the
//! collaborator traits declared here so it can be exercised without a
//! database or network.

pub mod auth;
pub mod blob;
pub mod credentials;
pub mod engagement;
pub mod gallery;
pub mod gateway;
pub mod moderation;
pub mod notify;
pub mod platform;
pub mod quota;
pub mod rate_limit;
pub mod realtime;
pub mod session;
pub mod signup;
pub mod subscription;
pub mod telemetry;
pub mod tenant;
pub mod upload_gate;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
