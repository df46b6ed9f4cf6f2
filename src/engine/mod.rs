pub mod ledger;
pub mod lifecycle;
pub mod matching;
pub mod notifier;
pub mod pricing;
pub mod queue;
pub mod reporting;
