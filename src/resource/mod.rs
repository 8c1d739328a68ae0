//! Declaration resource model.
//!
//! # Data Flow
//! ```text
//! manifest / store object
//!     → types.rs (Declaration { metadata, spec, status })
//!     → validation.rs (range checks before reconciling)
//! ```

pub mod types;
pub mod validation;

pub use types::{
    Declaration, DeclarationSpec, DeclarationStatus, HealthRecord, KeyError, ObjectKey,
    ObjectMeta,
};
pub use validation::{validate_spec, SpecError};
