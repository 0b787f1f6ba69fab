pub mod action_item;
pub mod break_even;
pub mod business_plan;
pub mod conversation;
pub mod extracted_list;
pub mod message;
pub mod provider;

pub use action_item::{ActionItem, ActionItemPatch, NewActionItem};
pub use break_even::{
    BreakEvenData, BreakEvenPoint, BreakEvenUpdate, ComputedBreakEven, CostBreakdown,
};
pub use business_plan::{BusinessPlan, PlanSection, SectionKey};
pub use conversation::Conversation;
pub use extracted_list::{ExtractedList, ListInput};
pub use message::{Message, Role};
pub use provider::ProviderId;

use serde::{Deserialize, Deserializer};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
