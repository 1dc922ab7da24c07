//! Capacity model.
//!
//! Resolves each resource's available time into queryable capacity. Two
//! interval sources exist per resource: one-off [`CapacityInterval`]s and
//! [`RecurringCapacityInterval`] rules, which expand into the same interval
//! shape for a query window. A [`CapacityProfile`] merges both and answers
//! placement queries.
//!
//! The allowed-helper relation lives here too, in a hash form for ad-hoc
//! queries and a dense matrix form for the simulation hot path.

mod helpers;
mod interval;
mod profile;
mod recurring;

pub use helpers::{AllowedHelperList, AllowedHelperMatrix, HelperLookup, ResourceIndex};
pub use interval::{overlap_duration, CapacityInterval};
pub use profile::{intersects, CapacityProfile, HeldSpan};
pub use recurring::{day_start, OccurrenceOverride, Recurrence, RecurringCapacityInterval};
