//! Deterministic allocation and eligibility logic.
//!
//! Nothing in this module writes to storage: the resolver reads ownership
//! through its source, and everything else is pure computation over domain
//! values.

pub mod allocation;
pub mod eligibility;
pub mod resolver;
pub mod split;

pub use allocation::{plan_allocation, AllocationError, AllocationPlan, FeePolicy};
pub use eligibility::{Eligibility, EligibilityReason, PayoutPolicy};
pub use resolver::{
    resolve_media, OwnershipResolver, ResolveError, ResolvedOwner, ResolvedOwnership,
};
pub use split::{largest_remainder_split, SplitError};
