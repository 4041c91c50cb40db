pub mod company;
pub mod public;
pub mod webhooks;
