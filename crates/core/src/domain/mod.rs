pub mod interaction;
pub mod measurements;
pub mod order;
pub mod product;
pub mod review;
pub mod user;
