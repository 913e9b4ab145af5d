/*
 * Responsibility
 * - Transport-independent building blocks: signatures, identity cipher,
 *   tokens, request context, scheduler lock
 * - Handlers and middleware only orchestrate these
 */
pub mod cache;
pub mod clock;
pub mod context;
pub mod headers;
pub mod identity_cipher;
pub mod lock;
pub mod outbound;
pub mod signature;
pub mod token;
