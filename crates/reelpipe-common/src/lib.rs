//! Reelpipe-Common: shared types used by every reelpipe crate.
//!
//! - **Error taxonomy**: [`Error`] and its stable [`ErrorKind`] codes
//! - **Typed IDs**: [`JobId`]
//! - **Job vocabulary**: [`JobStatus`]
//! - **Media payloads**: [`RawMedia`]
//!
//! # Examples
//!
//! ```
//! use reelpipe_common::{Error, ErrorKind, JobId};
//!
//! let id = JobId::new();
//! let err = Error::JobNotFound(id);
//! assert_eq!(err.kind(), ErrorKind::JobNotFound);
//! assert_eq!(err.http_status(), 404);
//! ```

pub mod error;
pub mod ids;
pub mod media;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use ids::*;
pub use media::RawMedia;
pub use types::*;
