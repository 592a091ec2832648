//! Convenience macros for plugin development.

/// Macro for quickly building a `HookContext`.
///
/// # Example
/// ```rust,ignore
/// let ctx = hook_context!({
///     "method" => json!("GET"),
///     "path" => json!("/health"),
/// });
/// ```
#[macro_export]
macro_rules! hook_context {
    () => {
        $crate::prelude::HookContext::new()
    };
    ({ $($key:expr => $value:expr),* $(,)? }) => {{
        let mut context = $crate::prelude::HookContext::new();
        $(
            context.insert($key, $value);
        )*
        context
    }};
}

/// Macro for declaring the hook list a plugin returns from `hooks()`.
///
/// # Example
/// ```rust,ignore
/// fn hooks(&self) -> Vec<String> {
///     hook_names![HookPoint::BeforeRequest, "audit_event"]
/// }
/// ```
#[macro_export]
macro_rules! hook_names {
    ($($hook:expr),* $(,)?) => {
        vec![$($hook.to_string()),*]
    };
}
