//! Read-only view of the name database for request handlers

use crate::db::NameDb;
use crate::error::Result;
use namechain_core::{ChainStore, Output, OutputReference};

/// Name queries a command handler may run
///
/// Object safe so handlers can hold `&dyn NameLookup` without knowing the
/// chain store behind it.
pub trait NameLookup: Send + Sync {
    /// Current reference for `name`
    fn get_ref(&self, name: &str) -> Result<OutputReference>;

    /// True if `name` has an entry
    fn has_ref(&self, name: &str) -> bool;

    /// Output currently claiming `name`
    fn resolve_record(&self, name: &str) -> Result<Output>;

    /// Blocks elapsed since the claim was recorded
    fn claim_age(&self, reference: &OutputReference) -> Result<u32>;

    /// Ledger head height
    fn head_height(&self) -> Result<u32>;
}

impl<C: ChainStore> NameLookup for NameDb<C> {
    fn get_ref(&self, name: &str) -> Result<OutputReference> {
        NameDb::get_ref(self, name)
    }

    fn has_ref(&self, name: &str) -> bool {
        NameDb::has_ref(self, name)
    }

    fn resolve_record(&self, name: &str) -> Result<Output> {
        NameDb::resolve_record(self, name)
    }

    fn claim_age(&self, reference: &OutputReference) -> Result<u32> {
        NameDb::claim_age(self, reference)
    }

    fn head_height(&self) -> Result<u32> {
        NameDb::head_height(self)
    }
}
