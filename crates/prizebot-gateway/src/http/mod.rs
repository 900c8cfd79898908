pub mod giveaways;
pub mod health;
