pub mod convert;
pub mod error;
pub mod types;

pub use error::{Result, SyncError};
pub use types::{
    Allocation, CodeName, DefinedValue, DuplicateKeyGroup, Fund, MigrationCandidate, SourceDonation,
    SourceDonor, SourceScan, TargetAccount, TargetDonation, TargetDonationRecord, TargetScan,
    UnmatchedAccount, UnmatchedDonation, Valuable,
};
