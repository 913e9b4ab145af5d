//! Header names shared by the gateway, this service and its downstream peers.
use axum::http::HeaderName;

pub const USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const USER_NO: HeaderName = HeaderName::from_static("x-user-no");
pub const SERVICE_ID: HeaderName = HeaderName::from_static("x-service-id");
pub const ROLE: HeaderName = HeaderName::from_static("x-role");
pub const AUTHORITIES: HeaderName = HeaderName::from_static("x-auth");
pub const PROVIDER: HeaderName = HeaderName::from_static("x-provider");
pub const NICKNAME: HeaderName = HeaderName::from_static("x-nick-name");
pub const CLIENT_IP: HeaderName = HeaderName::from_static("x-client-ip");
pub const DEVICE_CODE: HeaderName = HeaderName::from_static("x-device-cd");
pub const DEVICE_DETAIL: HeaderName = HeaderName::from_static("x-device-str");

pub const GATEWAY_SIGNATURE: HeaderName = HeaderName::from_static("x-gateway-signature");
pub const GATEWAY_TIMESTAMP: HeaderName = HeaderName::from_static("x-gateway-timestamp");

pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
