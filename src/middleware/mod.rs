/*
 * Responsibility
 * - gateway: signature check + identity resolution for /api/v1
 * - http: request id, tracing, limits for the whole app
 */
pub mod gateway;
pub mod http;
