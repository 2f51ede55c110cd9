pub mod card;
pub mod features;
pub mod shot;
