pub mod account;
pub mod client;
pub mod driver;
pub mod ledger;
pub mod notification;
pub mod trip;
