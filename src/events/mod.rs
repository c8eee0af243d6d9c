pub mod ai_chat;
pub mod auto_purge;
pub mod automod;
pub mod owner_notify;
pub mod welcome;
