//! Ledger state storage trait.

use tally_ledger::LedgerState;

use crate::StoreError;

pub trait LedgerStore {
    /// The last saved state, unvalidated.
    fn load_ledger_state(&self) -> Result<Option<LedgerState>, StoreError>;

    fn save_ledger_state(&self, state: &LedgerState) -> Result<(), StoreError>;
}
