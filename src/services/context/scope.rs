//! Request-scoped security context.
//!
//! The context lives in a tokio task-local slot that exists only while a
//! request future runs inside [`RequestContext::scope`]. Nothing outlives the
//! scope, so a worker that picks up the next request starts with an empty
//! slot. Inside the scope the slot is written once by the gateway middleware
//! and read by anyone.
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::services::context::SecurityContext;

tokio::task_local! {
    static CURRENT: RefCell<Option<Arc<SecurityContext>>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("security context already set for this request")]
    AlreadySet,
    #[error("no request scope is active")]
    NoScope,
}

/// Clears the context when dropped: normal return, early `?`, panic unwind or
/// the request future being cancelled.
#[must_use = "dropping the guard clears the context immediately"]
#[derive(Debug)]
pub struct ContextGuard {
    _priv: (),
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        RequestContext::clear();
    }
}

/// Accessors for the context of the request the current task is serving.
///
/// Reads outside a scope, or before the context is set, behave as anonymous.
pub struct RequestContext;

impl RequestContext {
    /// Run `fut` with a fresh, empty context slot.
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        CURRENT.scope(RefCell::new(None), fut).await
    }

    /// Synchronous counterpart of [`scope`](Self::scope).
    pub fn sync_scope<R>(f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(RefCell::new(None), f)
    }

    pub fn set(ctx: impl Into<Arc<SecurityContext>>) -> Result<ContextGuard, ContextError> {
        let ctx = ctx.into();
        CURRENT
            .try_with(|slot| {
                let mut slot = slot.borrow_mut();
                if slot.is_some() {
                    return Err(ContextError::AlreadySet);
                }
                *slot = Some(ctx);
                Ok(ContextGuard { _priv: () })
            })
            .map_err(|_| ContextError::NoScope)?
    }

    pub fn get() -> Option<Arc<SecurityContext>> {
        CURRENT
            .try_with(|slot| slot.borrow().clone())
            .ok()
            .flatten()
    }

    pub fn clear() {
        let _ = CURRENT.try_with(|slot| slot.borrow_mut().take());
    }

    pub fn current_user_id() -> Option<String> {
        Self::get().and_then(|ctx| ctx.user_id.clone())
    }

    pub fn current_user_no() -> Option<i64> {
        Self::get().and_then(|ctx| ctx.user_no)
    }

    pub fn current_role() -> Option<String> {
        Self::get().and_then(|ctx| ctx.role.clone())
    }

    pub fn current_service_id() -> Option<String> {
        Self::get().and_then(|ctx| ctx.service_id.clone())
    }

    pub fn current_access_token() -> Option<String> {
        Self::get().and_then(|ctx| ctx.access_token.clone())
    }

    pub fn current_authorities() -> BTreeSet<String> {
        Self::get()
            .map(|ctx| ctx.authorities.clone())
            .unwrap_or_default()
    }

    pub fn has_auth(authority: &str) -> bool {
        Self::get().is_some_and(|ctx| ctx.has_auth(authority))
    }

    pub fn has_any_auth(authorities: &[&str]) -> bool {
        Self::get().is_some_and(|ctx| ctx.has_any_auth(authorities))
    }

    pub fn has_all_auth(authorities: &[&str]) -> bool {
        Self::get().is_some_and(|ctx| ctx.has_all_auth(authorities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> SecurityContext {
        SecurityContext {
            user_id: Some("user@example.com".into()),
            user_no: Some(1),
            authorities: ["ADMIN", "USER"].into_iter().map(String::from).collect(),
            ..SecurityContext::default()
        }
    }

    #[test]
    fn unset_context_reads_as_anonymous() {
        assert!(RequestContext::get().is_none());
        assert!(RequestContext::current_authorities().is_empty());
        assert!(!RequestContext::has_auth("ADMIN"));

        RequestContext::sync_scope(|| {
            assert_eq!(RequestContext::current_user_id(), None);
            assert!(RequestContext::current_authorities().is_empty());
        });
    }

    #[test]
    fn clear_drops_identity_and_authorities() {
        RequestContext::sync_scope(|| {
            let guard = RequestContext::set(admin()).unwrap();
            assert_eq!(
                RequestContext::current_user_id().as_deref(),
                Some("user@example.com")
            );
            assert!(RequestContext::has_auth("ADMIN"));

            drop(guard);
            assert_eq!(RequestContext::current_user_id(), None);
            assert!(!RequestContext::has_auth("ADMIN"));
        });
    }

    #[test]
    fn context_is_set_once() {
        RequestContext::sync_scope(|| {
            let _guard = RequestContext::set(admin()).unwrap();
            assert_eq!(
                RequestContext::set(SecurityContext::anonymous()).unwrap_err(),
                ContextError::AlreadySet
            );
            assert_eq!(RequestContext::current_user_no(), Some(1));
        });
    }

    #[test]
    fn set_outside_a_scope_fails() {
        assert_eq!(
            RequestContext::set(admin()).unwrap_err(),
            ContextError::NoScope
        );
    }

    #[test]
    fn membership_checks_are_case_sensitive() {
        RequestContext::sync_scope(|| {
            let _guard = RequestContext::set(admin()).unwrap();
            assert!(!RequestContext::has_auth("admin"));
            assert!(RequestContext::has_any_auth(&["admin", "USER"]));
            assert!(!RequestContext::has_any_auth(&["GUEST"]));
            assert!(RequestContext::has_all_auth(&["ADMIN", "USER"]));
            assert!(!RequestContext::has_all_auth(&["ADMIN", "GUEST"]));
        });
    }

    #[tokio::test]
    async fn concurrent_scopes_do_not_see_each_other() {
        let first = tokio::spawn(RequestContext::scope(async {
            let _guard = RequestContext::set(admin()).unwrap();
            tokio::task::yield_now().await;
            RequestContext::current_user_id()
        }));
        let second = tokio::spawn(RequestContext::scope(async {
            tokio::task::yield_now().await;
            RequestContext::current_user_id()
        }));

        assert_eq!(first.await.unwrap().as_deref(), Some("user@example.com"));
        assert_eq!(second.await.unwrap(), None);
    }

    fn failing_handler() -> Result<(), ContextError> {
        let _guard = RequestContext::set(admin())?;
        assert!(RequestContext::has_auth("ADMIN"));
        Err(ContextError::NoScope)
    }

    #[test]
    fn guard_clears_the_slot_on_early_return() {
        RequestContext::sync_scope(|| {
            assert!(failing_handler().is_err());

            // Same scope, slot already emptied by the guard.
            assert!(RequestContext::get().is_none());
            assert!(!RequestContext::has_auth("ADMIN"));
            assert!(RequestContext::set(admin()).is_ok());
        });
    }

    #[tokio::test]
    async fn guard_clears_the_slot_when_the_handler_errors() {
        RequestContext::scope(async {
            let result = async {
                let _guard = RequestContext::set(admin()).unwrap();
                tokio::task::yield_now().await;
                Err::<(), &str>("handler failed")
            }
            .await;

            assert!(result.is_err());
            assert!(RequestContext::current_user_id().is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn leaked_guard_does_not_escape_its_scope() {
        RequestContext::scope(async {
            RequestContext::scope(async {
                std::mem::forget(RequestContext::set(admin()).unwrap());
                assert!(RequestContext::has_auth("ADMIN"));
            })
            .await;

            // The inner tokio scope owns its slot and discards it on exit.
            assert!(RequestContext::get().is_none());
        })
        .await;
    }
}
