//! Payment domain types, error taxonomy and the storage seam.

pub mod error;
pub mod store;
pub mod types;

pub use error::{PaymentError, PaymentResult};
pub use store::PaymentStore;
pub use types::{PaymentMethod, PaymentOutcome, PaymentRecord, PaymentStatus};
