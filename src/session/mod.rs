pub mod manager;
pub mod store;
pub mod turn;

pub use manager::SessionManager;
pub use store::{ConversationStore, StoreError, UserProfile};
pub use turn::{TurnController, TurnRequest, TurnState};
