mod capability;
mod dispatcher;
mod error;
mod recovery;
mod registry;

pub use capability::{Capability, CapabilityDescriptor, RejectionKind, Validation};
pub use dispatcher::{DEFAULT_CAPABILITY_TIMEOUT, DispatchOutcome, Dispatcher, canonical_key};
pub use error::{CapabilityError, RegistryError};
pub use recovery::{DirectoryListingRecovery, LIST_DIRECTORY, RecoveryPolicy, SHELL};
pub use registry::CapabilityRegistry;
