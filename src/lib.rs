pub mod collector;
pub mod fetch;
pub mod mailer;
pub mod parser;
pub mod pipeline;
pub mod product;
pub mod watchlist;
