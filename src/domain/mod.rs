//! Core value types shared across the engine.

mod card;
mod card_key;
mod rank;
mod resource_name;

pub use card::{Card, CardLink, CardMetadata, CardRecord};
pub use card_key::{CardKey, module_name_from_card_key};
pub(crate) use card_key::is_valid_prefix;
pub use rank::Rank;
pub use resource_name::{ResourceName, ResourceType};
