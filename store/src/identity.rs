//! Node keypair storage trait.

use tally_types::KeyPair;

use crate::StoreError;

pub trait IdentityStore {
    fn load_identity(&self) -> Result<Option<KeyPair>, StoreError>;

    fn save_identity(&self, keys: &KeyPair) -> Result<(), StoreError>;
}
