/*
 * Responsibility
 * - Extractors handlers use to read what the gateway middleware resolved
 */
mod current_context;

pub use current_context::CurrentContext;
