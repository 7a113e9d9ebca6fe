pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ownership;
pub mod service;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    AllocationRecord, AllocationStatus, ArtistAccount, ArtistId, MediaId, MediaOwnership, Money,
    OwnerRef, OwnershipEntry, PayoutMethod, PayoutRequest, PayoutStatus, Share, TimeMs, TipEvent,
    TipId,
};
pub use error::AppError;
pub use ownership::{InMemoryOwnershipSource, OwnershipSource};
pub use service::{EscrowLedger, LedgerError, MatchingService, PayoutService};
