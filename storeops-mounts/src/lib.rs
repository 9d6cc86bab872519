//! Mount validation for `storeops-mounts`.
//!
//! `MountValidator::check(paths)` decides whether the paths an operation needs
//! sit on a real mounted filesystem. Only paths under the conventional mount
//! root or under a configured network-mount target are checked; everything
//! else is accepted as-is.

mod error;
mod probe;
mod validator;

pub use error::MountError;
pub use probe::{parse_mountinfo, MountProbe, SystemProbe};
pub use validator::{nearest_existing_ancestor, MountCheck, MountValidator};
