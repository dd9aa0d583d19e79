//! Per-request authenticated context.
//!
//! The bearer middleware runs the rest of the request inside [`scope`], so
//! tool handlers (and anything they call) can ask for the caller with
//! [`current_user`] without threading it through every signature. Each
//! request gets its own task-local value; concurrent requests never observe
//! each other's user.

use std::future::Future;

use mcpgate_api::User;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
}

tokio::task_local! {
    static CONTEXT: RequestContext;
}

/// Run `fut` with `ctx` as the current request context.
pub async fn scope<F>(ctx: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    CONTEXT.scope(ctx, fut).await
}

/// The authenticated user of the request being served, if any.
pub fn current_user() -> Option<User> {
    CONTEXT.try_with(|ctx| ctx.user.clone()).ok()
}
