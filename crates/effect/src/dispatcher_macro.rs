//! Macros for reducing dispatcher boilerplate.

/// Build a [`TypeDispatcher`](crate::TypeDispatcher) from `Intent => performer`
/// pairs.
///
/// Each performer is a closure taking the dispatcher, the concrete intent and
/// the result box, exactly as passed to [`TypeDispatcher::on`](crate::TypeDispatcher::on).
///
/// # Example
///
/// ```
/// use effect_core::{sync_perform, type_dispatcher, Dispatcher, Effect};
/// use serde_json::json;
///
/// #[derive(Debug, PartialEq)]
/// struct Add(i64, i64);
///
/// #[derive(Debug, PartialEq)]
/// struct Negate(i64);
///
/// let dispatcher = type_dispatcher! {
///     Add => |_, add, result| result.succeed(json!(add.0 + add.1)),
///     Negate => |_, n, result| result.succeed(json!(-n.0)),
/// }
/// .shared();
///
/// assert_eq!(sync_perform(Effect::new(Add(2, 3)), &dispatcher), Ok(json!(5)));
/// assert_eq!(sync_perform(Effect::new(Negate(7)), &dispatcher), Ok(json!(-7)));
/// ```
#[macro_export]
macro_rules! type_dispatcher {
    ($($intent:ty => $performer:expr),* $(,)?) => {
        $crate::TypeDispatcher::new()
            $(.on::<$intent, _>($performer))*
    };
}
