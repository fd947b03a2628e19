//! Migrates a fleet of Altinn app repositories from `IPageOrder`
//! implementations to `hidden` expressions on page layouts.

pub mod applier;
pub mod config;
pub mod error;
pub mod expression;
pub mod fleet;
pub mod ledger;
pub mod models;
pub mod oracle;
pub mod registry;
pub mod scanner;
pub mod workspace;
